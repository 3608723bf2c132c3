//! `strata pole`: manage the single-parent organizational unit hierarchy.
//!
//! Subcommands:
//! - `strata pole list`: flat listing, scoped by tenant
//! - `strata pole tree`: forest view with optional search filter
//! - `strata pole create | update | move | delete`

use std::io::Write;
use std::path::Path;

use clap::{Args, Subcommand};
use serde::Serialize;

use strata_core::hierarchy;
use strata_core::model::{NewOrgUnit, OrgUnit, OrgUnitPatch, ScopeFilter};
use strata_core::store::OrgUnitStore;
use strata_core::tree::{self, Forest};

use super::tree_view::write_forest;
use super::{fail, load_config, open_store, report};
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render, render_mode};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct PoleArgs {
    #[command(subcommand)]
    pub command: PoleCommand,
}

#[derive(Subcommand, Debug)]
pub enum PoleCommand {
    #[command(
        about = "List org units",
        after_help = "EXAMPLES:\n    # Units of one tenant plus shared templates\n    strata pole list --tenant acme\n\n    # Shared templates only\n    strata pole list --templates"
    )]
    List(ListArgs),

    #[command(
        about = "Show org units as a tree",
        after_help = "EXAMPLES:\n    # Tree of everything, roots expanded\n    strata pole tree\n\n    # Keep only branches leading to a match\n    strata pole tree --filter sécurité"
    )]
    Tree(TreeArgs),

    #[command(
        about = "Create an org unit",
        after_help = "EXAMPLES:\n    # A root unit owned by a tenant\n    strata pole create --name \"Direction SI\" --code DSI --tenant acme\n\n    # A shared template under another template\n    strata pole create --name \"RSSI\" --parent pl-1a2b --template"
    )]
    Create(CreateArgs),

    #[command(about = "Rename or re-describe an org unit")]
    Update(UpdateArgs),

    #[command(
        about = "Move an org unit under another parent",
        after_help = "EXAMPLES:\n    # Reparent\n    strata pole move pl-3c4d --parent pl-1a2b\n\n    # Make it a root\n    strata pole move pl-3c4d --parent none"
    )]
    Move(MoveArgs),

    #[command(about = "Delete an org unit that has no children")]
    Delete(DeleteArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Tenant whose units to show (shared templates included).
    #[arg(long, conflicts_with_all = ["templates", "all"])]
    pub tenant: Option<String>,

    /// Show shared templates only.
    #[arg(long, conflicts_with = "all")]
    pub templates: bool,

    /// Show every unit regardless of tenant.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Keep only nodes matching this text and their ancestors.
    #[arg(long)]
    pub filter: Option<String>,

    /// Expand every node, not just the roots.
    #[arg(long)]
    pub expand_all: bool,

    /// Tenant whose units to show (shared templates included).
    #[arg(long)]
    pub tenant: Option<String>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,

    /// Short code, e.g. `DSI`.
    #[arg(long)]
    pub code: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Parent unit ID.
    #[arg(long)]
    pub parent: Option<String>,

    /// Owning tenant. Defaults to `[tenant] default` from the project config.
    #[arg(long, conflicts_with = "template")]
    pub tenant: Option<String>,

    /// Create a shared template owned by no tenant.
    #[arg(long)]
    pub template: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: String,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub code: Option<String>,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Unit ID to move.
    pub id: String,

    /// New parent unit ID. Use "--parent none" to make it a root.
    #[arg(long)]
    pub parent: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    pub id: String,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct DeleteOutput {
    ok: bool,
    unit_id: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn run_pole(args: &PoleArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    match &args.command {
        PoleCommand::List(a) => run_list(a, output, project_root),
        PoleCommand::Tree(a) => run_tree(a, output, project_root),
        PoleCommand::Create(a) => run_create(a, output, project_root),
        PoleCommand::Update(a) => run_update(a, output, project_root),
        PoleCommand::Move(a) => run_move(a, output, project_root),
        PoleCommand::Delete(a) => run_delete(a, output, project_root),
    }
}

fn list_scope(args: &ListArgs) -> ScopeFilter {
    if args.all {
        ScopeFilter::All
    } else if args.templates {
        ScopeFilter::Templates
    } else {
        args.tenant
            .clone()
            .map_or(ScopeFilter::All, ScopeFilter::TenantWithTemplates)
    }
}

fn unit_label(unit: &OrgUnit) -> String {
    let mut label = unit.name.clone();
    if let Some(code) = &unit.short_code {
        label.push_str(&format!(" [{code}]"));
    }
    if unit.is_template() {
        label.push_str(" (template)");
    }
    label
}

fn write_unit_row(unit: &OrgUnit, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}\t{}\t{}",
        unit.id,
        unit.name,
        unit.short_code.as_deref().unwrap_or("-"),
        unit.parent_id.as_deref().unwrap_or("-"),
        unit.tenant_scope.as_deref().unwrap_or("template"),
    )
}

fn write_unit_detail(unit: &OrgUnit, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("{}  {}", unit.id, unit.name))?;
    if let Some(code) = &unit.short_code {
        pretty_kv(w, "code", code)?;
    }
    if let Some(description) = &unit.description {
        pretty_kv(w, "description", description)?;
    }
    pretty_kv(w, "parent", unit.parent_id.as_deref().unwrap_or("(root)"))?;
    pretty_kv(
        w,
        "tenant",
        unit.tenant_scope.as_deref().unwrap_or("(shared template)"),
    )?;
    pretty_kv(w, "updated", unit.updated_at.to_rfc3339())
}

fn run_list(args: &ListArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root).map_err(|e| fail(output, e))?;
    let units = store
        .list_org_units(&list_scope(args))
        .map_err(|e| fail(output, e))?;

    render_mode(
        output,
        &units,
        |units, w| {
            for unit in units {
                write_unit_row(unit, w)?;
            }
            Ok(())
        },
        |units, w| {
            if units.is_empty() {
                return writeln!(w, "No org units.");
            }
            for unit in units {
                writeln!(w, "{:<14} {}", unit.id, unit_label(unit))?;
            }
            Ok(())
        },
    )
}

fn run_tree(args: &TreeArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let config = load_config(project_root).map_err(|e| fail(output, e))?;
    let store = open_store(project_root).map_err(|e| fail(output, e))?;

    let tenant = args.tenant.clone().or_else(|| config.tenant.default.clone());
    let scope = tenant.map_or(ScopeFilter::All, ScopeFilter::TenantWithTemplates);
    let units = store.list_org_units(&scope).map_err(|e| fail(output, e))?;

    let mut forest: Forest<OrgUnit> = tree::build_tree_with(units, config.build_options());
    if args.expand_all {
        forest = tree::expand_all(forest);
    }
    if let Some(query) = &args.filter {
        forest = tree::filter_tree(forest, query);
    }

    render_mode(
        output,
        &forest,
        |forest, w| write_forest(w, forest, false, &unit_label),
        |forest, w| {
            if forest.is_empty() {
                return writeln!(w, "No matching org units.");
            }
            let stats = tree::stats(forest);
            write_forest(w, forest, true, &unit_label)?;
            writeln!(
                w,
                "\n{} unit(s), {} root(s), depth {}",
                stats.nodes, stats.roots, stats.max_depth
            )
        },
    )
}

fn run_create(args: &CreateArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let config = load_config(project_root).map_err(|e| fail(output, e))?;
    let store = open_store(project_root).map_err(|e| fail(output, e))?;

    let tenant = if args.template {
        None
    } else {
        args.tenant.clone().or(config.tenant.default)
    };

    let fields = NewOrgUnit {
        name: args.name.clone(),
        short_code: args.code.clone(),
        description: args.description.clone(),
        parent_id: args.parent.clone(),
        tenant_scope: tenant,
    };
    let unit = hierarchy::create_unit(&store, &fields).map_err(|e| fail(output, e))?;

    render_mode(output, &unit, write_unit_row, write_unit_detail)
}

fn run_update(args: &UpdateArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let patch = OrgUnitPatch {
        name: args.name.clone(),
        short_code: args.code.clone().map(Some),
        description: args.description.clone().map(Some),
        parent_id: None,
    };
    if patch.is_empty() {
        let msg = "nothing to update; pass --name, --code, or --description";
        return Err(report(output, CliError::new(msg)));
    }

    let store = open_store(project_root).map_err(|e| fail(output, e))?;
    let unit = hierarchy::update_unit(&store, &args.id, &patch).map_err(|e| fail(output, e))?;

    render_mode(output, &unit, write_unit_row, write_unit_detail)
}

fn run_move(args: &MoveArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    // "none" means root level.
    let new_parent = if args.parent.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(args.parent.as_str())
    };

    let store = open_store(project_root).map_err(|e| fail(output, e))?;
    let unit =
        hierarchy::reparent_unit(&store, &args.id, new_parent).map_err(|e| fail(output, e))?;

    render(output, &unit, |unit, w| match &unit.parent_id {
        Some(parent) => writeln!(w, "Moved {} under {parent}", unit.id),
        None => writeln!(w, "Moved {} to the root level", unit.id),
    })
}

fn run_delete(args: &DeleteArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let store = open_store(project_root).map_err(|e| fail(output, e))?;
    hierarchy::delete_unit(&store, &args.id).map_err(|e| fail(output, e))?;

    let out = DeleteOutput {
        ok: true,
        unit_id: args.id.clone(),
    };
    render(output, &out, |o, w| writeln!(w, "Deleted {}", o.unit_id))
}
