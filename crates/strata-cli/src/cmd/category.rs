//! `strata category`: categories and their multi-parent relationships.
//!
//! Subcommands:
//! - `strata category create | list | tree`
//! - `strata category parents <child>`: the child's parent edges
//! - `strata category candidates <child>`: categories it could attach to
//! - `strata category attach <child> --parent <P>`
//! - `strata category promote <relationship>`
//! - `strata category detach <relationship>`
//! - `strata category classify <entity> --category <C>` / `entities <C>`

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;

use strata_core::model::{Category, NewCategory, PlacedCategory, place_categories};
use strata_core::relations::{
    AttachmentState, EdgeSetFingerprint, ParentEdgeSet, RelationshipProtocol,
};
use strata_core::store::{RelationshipStore, SqliteStore};
use strata_core::tree;

use super::tree_view::write_forest;
use super::{fail, load_config, open_store};
use crate::output::{OutputMode, pretty_kv, pretty_section, render, render_mode};

// ---------------------------------------------------------------------------
// Clap types
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct CategoryArgs {
    #[command(subcommand)]
    pub command: CategoryCommand,
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    #[command(
        about = "Create a category",
        after_help = "EXAMPLES:\n    strata category create --name \"Pare-feu\" --kind control"
    )]
    Create(CreateArgs),

    #[command(about = "List categories with their parent counts")]
    List,

    #[command(
        about = "Show categories placed under their primary parent",
        after_help = "EXAMPLES:\n    # Primary-placement tree\n    strata category tree\n\n    # Only branches leading to a match\n    strata category tree --filter réseau"
    )]
    Tree(TreeArgs),

    #[command(about = "Show the parent relationships of a category")]
    Parents(ChildArgs),

    #[command(about = "List categories that could become a new parent")]
    Candidates(ChildArgs),

    #[command(
        about = "Attach a category under another parent",
        long_about = "Add a parent relationship. The first parent of a category becomes its primary.",
        after_help = "EXAMPLES:\n    strata category attach cat-fw --parent cat-net\n\n    # Refuse if the parents changed since `strata category parents` was shown\n    strata category attach cat-fw --parent cat-net --expect <fingerprint>"
    )]
    Attach(AttachArgs),

    #[command(
        about = "Make a relationship the primary one",
        after_help = "EXAMPLES:\n    strata category promote rel-3k9x"
    )]
    Promote(RelationshipArgs),

    #[command(
        about = "Remove a parent relationship",
        long_about = "Remove a parent relationship. The last parent of a category cannot be removed.\nEntities placed through the relationship are counted and unplaced.",
        after_help = "EXAMPLES:\n    strata category detach rel-3k9x"
    )]
    Detach(RelationshipArgs),

    #[command(about = "Classify an entity under a category")]
    Classify(ClassifyArgs),

    #[command(about = "List entities classified under a category")]
    Entities(ChildArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub name: String,

    /// Classification tag, e.g. `asset`, `control`, `risk_source`.
    #[arg(long)]
    pub kind: String,

    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Keep only nodes matching this text and their ancestors.
    #[arg(long)]
    pub filter: Option<String>,

    /// Expand every node, not just the roots.
    #[arg(long)]
    pub expand_all: bool,
}

#[derive(Args, Debug)]
pub struct ChildArgs {
    /// Category ID.
    pub category: String,
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Child category ID.
    pub child: String,

    /// Parent category ID.
    #[arg(long)]
    pub parent: String,

    /// Fingerprint from `strata category parents`; refuse if the parents changed since.
    #[arg(long, value_name = "FINGERPRINT")]
    pub expect: Option<EdgeSetFingerprint>,
}

#[derive(Args, Debug)]
pub struct RelationshipArgs {
    /// Relationship ID.
    pub relationship: String,

    /// Fingerprint from `strata category parents`; refuse if the parents changed since.
    #[arg(long, value_name = "FINGERPRINT")]
    pub expect: Option<EdgeSetFingerprint>,
}

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Opaque entity ID.
    pub entity: String,

    /// Category ID.
    #[arg(long)]
    pub category: String,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EdgeView {
    id: String,
    parent_category_id: String,
    parent_name: Option<String>,
    is_primary: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ParentsView {
    child_id: String,
    attachment: AttachmentState,
    fingerprint: String,
    edges: Vec<EdgeView>,
}

impl ParentsView {
    fn new(set: &ParentEdgeSet, names: &HashMap<String, String>) -> Self {
        Self {
            child_id: set.child_id().to_string(),
            attachment: set.state(),
            fingerprint: set.fingerprint().to_string(),
            edges: set
                .edges()
                .iter()
                .map(|e| EdgeView {
                    id: e.id.clone(),
                    parent_category_id: e.parent_category_id.clone(),
                    parent_name: names.get(&e.parent_category_id).cloned(),
                    is_primary: e.is_primary,
                    created_at: e.created_at,
                })
                .collect(),
        }
    }

    fn needs_primary(&self) -> bool {
        self.attachment == AttachmentState::Ambiguous
    }
}

#[derive(Debug, Serialize)]
struct AttachOutput {
    ok: bool,
    relationship_id: String,
    is_primary: bool,
    parents: ParentsView,
}

#[derive(Debug, Serialize)]
struct PromoteOutput {
    ok: bool,
    changed: bool,
    previous_primary: Option<String>,
    parents: ParentsView,
}

#[derive(Debug, Serialize)]
struct DetachOutput {
    ok: bool,
    relationship_id: String,
    removed_primary: bool,
    affected_entity_count: usize,
    auto_promoted: Option<String>,
    needs_primary: bool,
    parents: ParentsView,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn category_names(store: &SqliteStore, output: OutputMode) -> anyhow::Result<HashMap<String, String>> {
    let categories = store.list_categories().map_err(|e| fail(output, e))?;
    Ok(categories.into_iter().map(|c| (c.id, c.name)).collect())
}

fn placed_label(placed: &PlacedCategory) -> String {
    if placed.parent_count > 1 {
        format!(
            "{} <{}> (+{} secondary)",
            placed.category.name,
            placed.category.entity_category,
            placed.parent_count - 1
        )
    } else {
        format!(
            "{} <{}>",
            placed.category.name, placed.category.entity_category
        )
    }
}

fn write_category_row(category: &Category, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        w,
        "{}\t{}\t{}",
        category.id, category.name, category.entity_category
    )
}

fn write_parents_text(view: &ParentsView, w: &mut dyn Write) -> std::io::Result<()> {
    for edge in &view.edges {
        writeln!(
            w,
            "{}\t{}\t{}\t{}",
            edge.id,
            edge.parent_category_id,
            if edge.is_primary { "primary" } else { "-" },
            edge.parent_name.as_deref().unwrap_or("?"),
        )?;
    }
    Ok(())
}

fn write_parents_pretty(view: &ParentsView, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Parents of {}", view.child_id))?;
    if view.edges.is_empty() {
        return writeln!(w, "(no parents)");
    }
    for edge in &view.edges {
        writeln!(
            w,
            "{} {:<14} {} ({})",
            if edge.is_primary { "★" } else { " " },
            edge.id,
            edge.parent_name.as_deref().unwrap_or("?"),
            edge.parent_category_id,
        )?;
    }
    if view.needs_primary() {
        writeln!(w)?;
        writeln!(
            w,
            "warning: no primary parent. Promote one with `strata category promote <relationship>`."
        )?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub fn run_category(
    args: &CategoryArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let store = open_store(project_root).map_err(|e| fail(output, e))?;
    match &args.command {
        CategoryCommand::Create(a) => run_create(&store, a, output),
        CategoryCommand::List => run_list(&store, output),
        CategoryCommand::Tree(a) => run_tree(&store, a, output, project_root),
        CategoryCommand::Parents(a) => run_parents(&store, a, output),
        CategoryCommand::Candidates(a) => run_candidates(&store, a, output),
        CategoryCommand::Attach(a) => run_attach(&store, a, output),
        CategoryCommand::Promote(a) => run_promote(&store, a, output),
        CategoryCommand::Detach(a) => run_detach(&store, a, output, project_root),
        CategoryCommand::Classify(a) => run_classify(&store, a, output),
        CategoryCommand::Entities(a) => run_entities(&store, a, output),
    }
}

fn run_create(store: &SqliteStore, args: &CreateArgs, output: OutputMode) -> anyhow::Result<()> {
    let fields = NewCategory {
        name: args.name.clone(),
        entity_category: args.kind.clone(),
        description: args.description.clone(),
    };
    let category = store.create_category(&fields).map_err(|e| fail(output, e))?;

    render_mode(output, &category, write_category_row, |c, w| {
        pretty_section(w, &format!("{}  {}", c.id, c.name))?;
        pretty_kv(w, "kind", &c.entity_category)?;
        if let Some(description) = &c.description {
            pretty_kv(w, "description", description)?;
        }
        Ok(())
    })
}

fn run_list(store: &SqliteStore, output: OutputMode) -> anyhow::Result<()> {
    let categories = store.list_categories().map_err(|e| fail(output, e))?;
    let edges = store.list_relationships().map_err(|e| fail(output, e))?;
    let placed = place_categories(categories, &edges);

    render_mode(
        output,
        &placed,
        |placed, w| {
            for p in placed {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    p.category.id,
                    p.category.name,
                    p.category.entity_category,
                    p.parent_count
                )?;
            }
            Ok(())
        },
        |placed, w| {
            if placed.is_empty() {
                return writeln!(w, "No categories.");
            }
            for p in placed {
                writeln!(w, "{:<14} {}", p.category.id, placed_label(p))?;
            }
            Ok(())
        },
    )
}

fn run_tree(
    store: &SqliteStore,
    args: &TreeArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let config = load_config(project_root).map_err(|e| fail(output, e))?;
    let categories = store.list_categories().map_err(|e| fail(output, e))?;
    let edges = store.list_relationships().map_err(|e| fail(output, e))?;

    let mut forest = tree::build_tree_with(
        place_categories(categories, &edges),
        config.build_options(),
    );
    if args.expand_all {
        forest = tree::expand_all(forest);
    }
    if let Some(query) = &args.filter {
        forest = tree::filter_tree(forest, query);
    }

    render_mode(
        output,
        &forest,
        |forest, w| write_forest(w, forest, false, &placed_label),
        |forest, w| {
            if forest.is_empty() {
                return writeln!(w, "No matching categories.");
            }
            write_forest(w, forest, true, &placed_label)
        },
    )
}

fn run_parents(store: &SqliteStore, args: &ChildArgs, output: OutputMode) -> anyhow::Result<()> {
    let protocol = RelationshipProtocol::new(store);
    let set = protocol
        .parents(&args.category)
        .map_err(|e| fail(output, e))?;
    let view = ParentsView::new(&set, &category_names(store, output)?);

    render_mode(output, &view, write_parents_text, write_parents_pretty)
}

fn run_candidates(store: &SqliteStore, args: &ChildArgs, output: OutputMode) -> anyhow::Result<()> {
    let protocol = RelationshipProtocol::new(store);
    let candidates = protocol
        .candidates(&args.category)
        .map_err(|e| fail(output, e))?;

    render_mode(
        output,
        &candidates,
        |candidates, w| {
            for c in candidates {
                write_category_row(c, w)?;
            }
            Ok(())
        },
        |candidates, w| {
            if candidates.is_empty() {
                return writeln!(w, "No eligible parents.");
            }
            for c in candidates {
                writeln!(w, "{:<14} {} <{}>", c.id, c.name, c.entity_category)?;
            }
            Ok(())
        },
    )
}

fn run_attach(store: &SqliteStore, args: &AttachArgs, output: OutputMode) -> anyhow::Result<()> {
    let protocol = RelationshipProtocol::new(store);
    let outcome = match &args.expect {
        Some(expected) => protocol.add_if_unchanged(&args.child, &args.parent, expected),
        None => protocol.add(&args.child, &args.parent),
    }
    .map_err(|e| fail(output, e))?;

    let out = AttachOutput {
        ok: true,
        relationship_id: outcome.relationship.id.clone(),
        is_primary: outcome.relationship.is_primary,
        parents: ParentsView::new(&outcome.edges, &category_names(store, output)?),
    };
    render(output, &out, |o, w| {
        let kind = if o.is_primary { "primary" } else { "secondary" };
        writeln!(
            w,
            "Attached {} under {} as {kind} parent ({})",
            args.child, args.parent, o.relationship_id
        )
    })
}

fn run_promote(
    store: &SqliteStore,
    args: &RelationshipArgs,
    output: OutputMode,
) -> anyhow::Result<()> {
    let protocol = RelationshipProtocol::new(store);
    let outcome = match &args.expect {
        Some(expected) => protocol.promote_if_unchanged(&args.relationship, expected),
        None => protocol.promote(&args.relationship),
    }
    .map_err(|e| fail(output, e))?;

    let out = PromoteOutput {
        ok: true,
        changed: outcome.changed,
        previous_primary: outcome.previous_primary.clone(),
        parents: ParentsView::new(&outcome.edges, &category_names(store, output)?),
    };
    render(output, &out, |o, w| {
        if o.changed {
            writeln!(w, "{} is now the primary parent", args.relationship)
        } else {
            writeln!(w, "{} was already the primary parent", args.relationship)
        }
    })
}

fn run_detach(
    store: &SqliteStore,
    args: &RelationshipArgs,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let config = load_config(project_root).map_err(|e| fail(output, e))?;
    let protocol = RelationshipProtocol::with_options(store, config.protocol_options());
    let outcome = match &args.expect {
        Some(expected) => protocol.delete_if_unchanged(&args.relationship, expected),
        None => protocol.delete(&args.relationship),
    }
    .map_err(|e| fail(output, e))?;

    let out = DetachOutput {
        ok: true,
        relationship_id: args.relationship.clone(),
        removed_primary: outcome.removed_primary,
        affected_entity_count: outcome.affected_entity_count,
        auto_promoted: outcome.auto_promoted.clone(),
        needs_primary: outcome.needs_primary(),
        parents: ParentsView::new(&outcome.edges, &category_names(store, output)?),
    };
    render(output, &out, |o, w| {
        writeln!(w, "Detached {}", o.relationship_id)?;
        if o.affected_entity_count > 0 {
            writeln!(
                w,
                "{} classified entit{} lost their placement",
                o.affected_entity_count,
                if o.affected_entity_count == 1 { "y" } else { "ies" }
            )?;
        }
        if let Some(promoted) = &o.auto_promoted {
            writeln!(w, "{promoted} promoted to primary")?;
        }
        if o.needs_primary {
            writeln!(
                w,
                "warning: {} has no primary parent. Promote one with `strata category promote <relationship>`.",
                o.parents.child_id
            )?;
        }
        Ok(())
    })
}

fn run_classify(store: &SqliteStore, args: &ClassifyArgs, output: OutputMode) -> anyhow::Result<()> {
    let entity = store
        .classify_entity(&args.entity, &args.category)
        .map_err(|e| fail(output, e))?;

    render(output, &entity, |e, w| {
        writeln!(
            w,
            "Classified {} under {} via {}",
            e.entity_id,
            e.category_id,
            e.placement_relationship_id.as_deref().unwrap_or("(no primary parent)")
        )
    })
}

fn run_entities(store: &SqliteStore, args: &ChildArgs, output: OutputMode) -> anyhow::Result<()> {
    store.get_category(&args.category).map_err(|e| fail(output, e))?;
    let entities = store
        .list_classified_entities(&args.category)
        .map_err(|e| fail(output, e))?;

    render(output, &entities, |entities, w| {
        for e in entities {
            writeln!(
                w,
                "{}\t{}",
                e.entity_id,
                e.placement_relationship_id.as_deref().unwrap_or("-")
            )?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::model::CategoryRelationship;

    fn category(id: &str, name: &str) -> Category {
        Category {
            id: id.into(),
            name: name.into(),
            entity_category: "control".into(),
            description: None,
            created_at: Utc::now(),
        }
    }

    fn edge(id: &str, parent: &str, child: &str, is_primary: bool) -> CategoryRelationship {
        CategoryRelationship {
            id: id.into(),
            parent_category_id: parent.into(),
            child_category_id: child.into(),
            is_primary,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parents_view_resolves_names_and_state() {
        let set = ParentEdgeSet::from_relationships(
            "cat-fw",
            vec![
                edge("rel-1", "cat-net", "cat-fw", true),
                edge("rel-2", "cat-infra", "cat-fw", false),
            ],
        );
        let names = HashMap::from([("cat-net".to_string(), "Sécurité Réseau".to_string())]);
        let view = ParentsView::new(&set, &names);

        assert!(!view.needs_primary());
        assert_eq!(view.edges.len(), 2);
        assert_eq!(view.edges[0].parent_name.as_deref(), Some("Sécurité Réseau"));
        assert_eq!(view.edges[1].parent_name, None);
        assert_eq!(view.fingerprint, set.fingerprint().to_string());
    }

    #[test]
    fn parents_view_flags_missing_primary() {
        let set = ParentEdgeSet::from_relationships(
            "cat-fw",
            vec![edge("rel-2", "cat-infra", "cat-fw", false)],
        );
        let view = ParentsView::new(&set, &HashMap::new());
        assert!(view.needs_primary());

        let mut buf = Vec::new();
        write_parents_pretty(&view, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("warning: no primary parent"));
    }

    #[test]
    fn placed_label_counts_secondary_parents() {
        let placed = place_categories(
            vec![category("cat-fw", "Pare-feu")],
            &[
                edge("rel-1", "cat-net", "cat-fw", true),
                edge("rel-2", "cat-infra", "cat-fw", false),
            ],
        );
        assert_eq!(placed_label(&placed[0]), "Pare-feu <control> (+1 secondary)");
    }
}
