use helpdesk_core::domain::allowance::parse_grant_amount;
use helpdesk_db::{AllowanceRepository, JsonAllowanceRepository};

use crate::commands::{load_config, open_store, runtime, CommandResult, EXIT_STORE, EXIT_VALIDATION};

pub fn run(user_id: &str, amount: &str) -> CommandResult {
    let user_id = user_id.trim();
    if user_id.is_empty() || !user_id.chars().all(|ch| ch.is_ascii_digit()) {
        return CommandResult::failure(
            "allow",
            "validation",
            format!("user id must be numeric, got `{user_id}`"),
            EXIT_VALIDATION,
        );
    }
    let amount = match parse_grant_amount(amount) {
        Ok(amount) => amount,
        Err(error) => {
            return CommandResult::failure("allow", "validation", error.to_string(), EXIT_VALIDATION)
        }
    };

    let config = match load_config("allow") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("allow") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let store = open_store(&config);
    let result = runtime.block_on(async {
        // a lenient load would replace an unreadable file with a fresh document
        store.inspect().await.map_err(|error| error.to_string())?;
        JsonAllowanceRepository::new(store.clone())
            .grant(user_id, amount)
            .await
            .map_err(|error| error.to_string())
    });

    match result {
        Ok(granted) => CommandResult::success(
            "allow",
            format!("user {user_id} may now submit feedback {granted} time(s)"),
        ),
        Err(message) => CommandResult::failure("allow", "store", message, EXIT_STORE),
    }
}
