use colored::Colorize;
use context::{GuardAction, GuardState};
use errors::ResolutionError;
use pos_core::OperationalContext;
use serde_json::{Value, json};

pub fn header(title: &str) {
    println!("{}", title.bold().underline());
}

pub fn info(msg: &str) {
    eprintln!("{} {}", "info:".blue().bold(), msg);
}

pub fn warn(msg: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "error:".red().bold(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

pub fn context_json(context: &OperationalContext) -> Value {
    json!({
        "profile": context.profile,
        "branch": context.branch,
        "company": context.company
    })
}

pub fn print_context(context: &OperationalContext) {
    println!("  profile: {}", context.profile.bold());
    println!("  branch:  {}", context.branch.bold());
    if let Some(company) = &context.company {
        println!("  company: {}", company);
    }
}

pub fn resolution_error_json(err: &ResolutionError) -> Value {
    json!({
        "error": err.to_string(),
        "category": err.category().as_str(),
        "retryable": err.category().is_retryable()
    })
}

pub fn print_resolution_error(err: &ResolutionError) {
    error(&err.to_string());
    eprintln!("  category: {}", err.category().as_str().dimmed());
}

pub fn action_json(action: &GuardAction) -> Value {
    match action {
        GuardAction::Render => json!({ "kind": "render" }),
        GuardAction::Redirect(url) => json!({ "kind": "redirect", "url": url }),
        GuardAction::InlineRemedy => json!({ "kind": "inline_remedy" }),
        GuardAction::Terminal { retry } => json!({ "kind": "terminal", "retry": retry }),
        GuardAction::Wait => json!({ "kind": "wait" }),
    }
}

pub fn guard_state_json(state: &GuardState) -> Value {
    let mut value = match state {
        GuardState::Loading => json!({ "state": "loading" }),
        GuardState::Passed { context, resource_id } => json!({
            "state": "passed",
            "context": context_json(context),
            "resourceId": resource_id
        }),
        GuardState::NoProfileAvailable => json!({ "state": "no_profile_available" }),
        GuardState::SelectionRequired { redirect } => json!({
            "state": "selection_required",
            "reason": redirect.reason,
            "returnTo": redirect.return_to
        }),
        GuardState::SecondaryResourceMissing { context } => json!({
            "state": "secondary_resource_missing",
            "context": context_json(context)
        }),
        GuardState::Error {
            message,
            category,
            retryable,
        } => json!({
            "state": "error",
            "message": message,
            "category": category.as_str(),
            "retryable": retryable
        }),
    };
    value["action"] = action_json(&state.action());
    value
}

pub fn print_guard_state(state: &GuardState) {
    match state {
        GuardState::Loading => println!("{}", "loading".dimmed()),
        GuardState::Passed { context, resource_id } => {
            success(&format!("passed as {context}"));
            if let Some(id) = resource_id {
                println!("  opening: {id}");
            }
        }
        GuardState::NoProfileAvailable => {
            error("No operational profile is available for this user. Contact an administrator.");
        }
        GuardState::SelectionRequired { redirect } => {
            warn("A profile and branch must be selected first");
            println!("  redirect: {}", redirect.url);
        }
        GuardState::SecondaryResourceMissing { context } => {
            warn(&format!("No open shift for {context}; open one to continue"));
        }
        GuardState::Error {
            message,
            category,
            retryable,
        } => {
            error(message);
            eprintln!(
                "  category: {}{}",
                category.as_str().dimmed(),
                if *retryable { " (retry possible)" } else { "" }
            );
        }
    }
}
