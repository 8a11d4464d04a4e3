//! Core domain and wire types.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The (profile, branch) pair that scopes every data request a terminal
/// makes.
///
/// A context is only ever persisted, broadcast or handed to consumers when
/// [`OperationalContext::is_valid`] holds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationalContext {
    pub profile: String,
    pub branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl OperationalContext {
    #[must_use]
    pub fn new(profile: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            branch: branch.into(),
            company: None,
        }
    }

    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Both `profile` and `branch` are non-blank.
    pub fn is_valid(&self) -> bool {
        !self.profile.trim().is_empty() && !self.branch.trim().is_empty()
    }

    /// Returns `Some(self)` only when the context is valid.
    pub fn validated(self) -> Option<Self> {
        if self.is_valid() { Some(self) } else { None }
    }

    /// True when both contexts select the same profile and branch.
    pub fn same_selection(&self, other: &Self) -> bool {
        self.profile == other.profile && self.branch == other.branch
    }
}

impl std::fmt::Display for OperationalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.profile, self.branch)
    }
}

/// A context together with the ordering stamp of the change that produced
/// it. This is the value sessions store and exchange.
///
/// Stamps are epoch milliseconds, bumped past the last stamp a session has
/// seen so they never go backwards. Equal stamps are settled by comparing
/// the contexts, so every session picks the same winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedContext {
    #[serde(flatten)]
    pub context: OperationalContext,
    pub stamp: u64,
}

impl StampedContext {
    pub fn new(context: OperationalContext, stamp: u64) -> Self {
        Self { context, stamp }
    }

    /// True when `self` is strictly newer than `other`.
    pub fn supersedes(&self, other: &Self) -> bool {
        (self.stamp, &self.context) > (other.stamp, &other.context)
    }

    pub fn validated(self) -> Option<Self> {
        if self.context.is_valid() { Some(self) } else { None }
    }
}

impl std::fmt::Display for StampedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.context, self.stamp)
    }
}

/// Where a successful resolution came from.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Memory,
    Cache,
    ServerActive,
    ServerAutoSelected,
    Unresolved,
}

impl ResolutionSource {
    /// Only an auto-selection has to be confirmed back to the server session.
    pub fn requires_write_back(self) -> bool {
        matches!(self, ResolutionSource::ServerAutoSelected)
    }
}

/// A successfully resolved context together with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub context: OperationalContext,
    pub source: ResolutionSource,
}

impl Resolution {
    pub fn new(context: OperationalContext, source: ResolutionSource) -> Self {
        Self { context, source }
    }
}

/// Who caused a context change seen on the resolver's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeOrigin {
    /// This session resolved, selected or invalidated the context.
    Local,
    /// Another session's change was adopted.
    Remote,
}

/// Notification emitted whenever the adopted context changes.
///
/// `context == None` means the context was invalidated. `stamp` orders the
/// change against changes made in other sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextChange {
    pub context: Option<OperationalContext>,
    pub origin: ChangeOrigin,
    pub stamp: u64,
}

impl ContextChange {
    /// The adopted context with its stamp, unless this change was a clear.
    pub fn stamped(&self) -> Option<StampedContext> {
        self.context
            .clone()
            .map(|context| StampedContext::new(context, self.stamp))
    }
}

/// A possibly partial `{profile, branch}` selection as sent by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionPayload {
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

impl SelectionPayload {
    pub fn into_context(self) -> Option<OperationalContext> {
        let context = OperationalContext {
            profile: self.profile?,
            branch: self.branch?,
            company: self.company,
        };
        context.validated()
    }
}

/// A profile the operator may select.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Default branch of the profile, if it is bound to exactly one.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

impl EligibleProfile {
    /// The context selecting this profile on its default branch.
    pub fn default_context(&self) -> Option<OperationalContext> {
        let context = OperationalContext {
            profile: self.id.clone(),
            branch: self.branch.clone()?,
            company: self.company.clone(),
        };
        context.validated()
    }
}

/// Response of `GetOperationalContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationalContextResponse {
    #[serde(default)]
    pub active_context: Option<SelectionPayload>,
    #[serde(default)]
    pub current_profile: Option<String>,
    #[serde(default)]
    pub current_branch: Option<String>,
    #[serde(default)]
    pub eligible_profiles: Vec<EligibleProfile>,
    #[serde(default)]
    pub requires_selection: bool,
    #[serde(default = "default_has_access")]
    pub has_access: bool,
}

fn default_has_access() -> bool {
    true
}

impl OperationalContextResponse {
    /// The selection already active in the server session, if any.
    ///
    /// `activeContext` wins; otherwise `currentProfile` + `currentBranch` are
    /// combined, borrowing the company from the matching eligible profile.
    pub fn active_selection(&self) -> Option<OperationalContext> {
        if let Some(active) = self.active_context.clone().and_then(SelectionPayload::into_context)
        {
            return Some(active);
        }

        let profile = self.current_profile.clone()?;
        let branch = self.current_branch.clone()?;
        let company = self
            .eligible_profiles
            .iter()
            .find(|p| p.id == profile)
            .and_then(|p| p.company.clone());

        OperationalContext {
            profile,
            branch,
            company,
        }
        .validated()
    }

    /// The only eligible profile's default context when selection is
    /// deterministic.
    pub fn auto_selection(&self) -> Option<OperationalContext> {
        match self.eligible_profiles.as_slice() {
            [only] => only.default_context(),
            _ => None,
        }
    }
}

/// Response of `SetOperationalContext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetContextResponse {
    pub success: bool,
    #[serde(default)]
    pub context: Option<SelectionPayload>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Response of `GetSecondaryResourceStatus` (e.g. the current opening).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryResourceStatus {
    #[serde(default)]
    pub resource_id: Option<String>,
}

impl SecondaryResourceStatus {
    pub fn open(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: Some(resource_id.into()),
        }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.resource_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_validity() {
        assert!(OperationalContext::new("cashier", "downtown").is_valid());
        assert!(!OperationalContext::new("", "downtown").is_valid());
        assert!(!OperationalContext::new("cashier", "   ").is_valid());
    }

    #[test]
    fn test_context_display() {
        let ctx = OperationalContext::new("waiter", "north").with_company("acme");
        assert_eq!(ctx.to_string(), "waiter@north");
    }

    #[test]
    fn test_later_stamp_supersedes() {
        let older = StampedContext::new(OperationalContext::new("waiter", "north"), 10);
        let newer = StampedContext::new(OperationalContext::new("cashier", "downtown"), 11);

        assert!(newer.supersedes(&older));
        assert!(!older.supersedes(&newer));
        assert!(!newer.supersedes(&newer.clone()));
    }

    #[test]
    fn test_equal_stamps_settle_on_the_same_winner() {
        let a = StampedContext::new(OperationalContext::new("cashier", "downtown"), 10);
        let b = StampedContext::new(OperationalContext::new("waiter", "north"), 10);

        assert!(b.supersedes(&a));
        assert!(!a.supersedes(&b));
    }

    #[test]
    fn test_stamped_context_wire_shape() {
        let stamped = StampedContext::new(OperationalContext::new("cashier", "downtown"), 42);
        let json = serde_json::to_string(&stamped).unwrap();
        assert_eq!(json, r#"{"profile":"cashier","branch":"downtown","stamp":42}"#);

        let unstamped = serde_json::from_str::<StampedContext>(r#"{"profile":"a","branch":"b"}"#);
        assert!(unstamped.is_err());
    }

    #[test]
    fn test_resolution_source_names() {
        assert_eq!(ResolutionSource::ServerAutoSelected.as_ref(), "server_auto_selected");
        assert_eq!(ResolutionSource::Memory.to_string(), "memory");
        assert!(ResolutionSource::ServerAutoSelected.requires_write_back());
        assert!(!ResolutionSource::ServerActive.requires_write_back());
    }

    #[test]
    fn test_selection_payload_partial_is_rejected() {
        let partial = SelectionPayload {
            profile: Some("cashier".to_string()),
            ..Default::default()
        };
        assert!(partial.into_context().is_none());
    }

    #[test]
    fn test_response_active_context_wins() {
        let json = r#"{
            "activeContext": {"profile": "cashier", "branch": "downtown"},
            "currentProfile": "waiter",
            "currentBranch": "north",
            "eligibleProfiles": [],
            "requiresSelection": false,
            "hasAccess": true
        }"#;

        let response: OperationalContextResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.active_selection(),
            Some(OperationalContext::new("cashier", "downtown"))
        );
    }

    #[test]
    fn test_response_current_fields_borrow_company() {
        let json = r#"{
            "currentProfile": "waiter",
            "currentBranch": "north",
            "eligibleProfiles": [
                {"id": "waiter", "company": "acme"},
                {"id": "cashier"}
            ],
            "requiresSelection": false
        }"#;

        let response: OperationalContextResponse = serde_json::from_str(json).unwrap();
        let selection = response.active_selection().unwrap();
        assert_eq!(selection.company.as_deref(), Some("acme"));
        assert!(response.has_access);
    }

    #[test]
    fn test_auto_selection_requires_single_profile_with_branch() {
        let mut response = OperationalContextResponse {
            active_context: None,
            current_profile: None,
            current_branch: None,
            eligible_profiles: vec![EligibleProfile {
                id: "kitchen".to_string(),
                name: None,
                branch: Some("central".to_string()),
                company: None,
            }],
            requires_selection: true,
            has_access: true,
        };
        assert_eq!(
            response.auto_selection(),
            Some(OperationalContext::new("kitchen", "central"))
        );

        response.eligible_profiles[0].branch = None;
        assert!(response.auto_selection().is_none());
    }

    #[test]
    fn test_secondary_resource_status() {
        assert!(SecondaryResourceStatus::open("shift-1").is_open());
        assert!(!SecondaryResourceStatus::missing().is_open());
        assert!(!SecondaryResourceStatus::open("").is_open());
    }
}
