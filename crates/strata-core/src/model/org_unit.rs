//! Organizational units ("pôles") and their tenant scoping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::TreeItem;

/// A single-parent organizational node.
///
/// `tenant_scope = None` marks a shared template that is visible to every
/// tenant but owned by none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgUnit {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub tenant_scope: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrgUnit {
    /// Returns `true` if this unit is a shared template (no owning tenant).
    #[must_use]
    pub const fn is_template(&self) -> bool {
        self.tenant_scope.is_none()
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

impl TreeItem for OrgUnit {
    fn node_id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        fields.extend(self.short_code.as_deref());
        fields.extend(self.description.as_deref());
        fields
    }
}

/// Fields for creating an org unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrgUnit {
    pub name: String,
    pub short_code: Option<String>,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub tenant_scope: Option<String>,
}

impl NewOrgUnit {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_short_code(mut self, code: impl Into<String>) -> Self {
        self.short_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant_scope = Some(tenant.into());
        self
    }
}

/// Partial update of an org unit.
///
/// The nested options distinguish "leave unchanged" (`None`) from "clear"
/// (`Some(None)`). Clearing `parent_id` makes the unit a root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgUnitPatch {
    pub name: Option<String>,
    pub short_code: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<String>>,
}

impl OrgUnitPatch {
    /// A patch that only changes the parent.
    #[must_use]
    pub fn reparent(parent_id: Option<String>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.short_code.is_none()
            && self.description.is_none()
            && self.parent_id.is_none()
    }

    /// The new parent, if this patch moves the unit somewhere other than
    /// the root level.
    #[must_use]
    pub fn new_parent(&self) -> Option<&str> {
        self.parent_id.as_ref().and_then(|p| p.as_deref())
    }
}

/// Which units a listing should include.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScopeFilter {
    /// Every unit regardless of owner.
    #[default]
    All,
    /// Shared templates only.
    Templates,
    /// Units owned by one tenant, excluding templates.
    Tenant(String),
    /// Units owned by one tenant plus all shared templates.
    TenantWithTemplates(String),
}

impl ScopeFilter {
    /// Returns `true` if a unit with the given `tenant_scope` is visible
    /// through this filter.
    #[must_use]
    pub fn admits(&self, tenant_scope: Option<&str>) -> bool {
        match (self, tenant_scope) {
            (Self::All, _) | (Self::Templates | Self::TenantWithTemplates(_), None) => true,
            (Self::Tenant(t) | Self::TenantWithTemplates(t), Some(owner)) => t == owner,
            (Self::Templates, Some(_)) | (Self::Tenant(_), None) => false,
        }
    }
}
