use pos_core::{EligibleProfile, OperationalContext, OperationalContextResponse, SelectionPayload};
use std::sync::atomic::{AtomicU32, Ordering};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// A unique broadcast topic so parallel tests never share a channel.
pub fn unique_topic() -> String {
    unique_id("pos-test-topic")
}

pub fn cashier_downtown() -> OperationalContext {
    OperationalContext::new("cashier", "downtown")
}

pub fn waiter_north() -> OperationalContext {
    OperationalContext::new("waiter", "north")
}

pub fn eligible(id: &str, branch: Option<&str>) -> EligibleProfile {
    EligibleProfile {
        id: id.to_string(),
        name: Some(id.to_uppercase()),
        branch: branch.map(str::to_string),
        company: None,
    }
}

fn empty_response() -> OperationalContextResponse {
    OperationalContextResponse {
        active_context: None,
        current_profile: None,
        current_branch: None,
        eligible_profiles: Vec::new(),
        requires_selection: false,
        has_access: true,
    }
}

/// The server session already holds `context`.
pub fn active_response(context: &OperationalContext) -> OperationalContextResponse {
    OperationalContextResponse {
        active_context: Some(SelectionPayload {
            profile: Some(context.profile.clone()),
            branch: Some(context.branch.clone()),
            company: context.company.clone(),
        }),
        eligible_profiles: vec![eligible(&context.profile, Some(&context.branch))],
        ..empty_response()
    }
}

/// Nothing active, exactly one eligible profile with a default branch.
pub fn single_profile_response(profile: &str, branch: &str) -> OperationalContextResponse {
    OperationalContextResponse {
        eligible_profiles: vec![eligible(profile, Some(branch))],
        requires_selection: true,
        ..empty_response()
    }
}

/// Nothing active, several eligible profiles.
pub fn selection_required_response(profiles: &[&str]) -> OperationalContextResponse {
    OperationalContextResponse {
        eligible_profiles: profiles.iter().map(|id| eligible(id, Some("main"))).collect(),
        requires_selection: true,
        ..empty_response()
    }
}

/// The operator has no eligible profile at all.
pub fn no_access_response() -> OperationalContextResponse {
    OperationalContextResponse {
        has_access: false,
        ..empty_response()
    }
}
