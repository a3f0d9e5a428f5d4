use helpdesk_db::{FeedbackRepository, JsonFeedbackRepository};

use crate::commands::{load_config, open_store, runtime, CommandResult, EXIT_STORE};

pub fn run(limit: Option<usize>) -> CommandResult {
    let config = match load_config("feedback") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("feedback") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let store = open_store(&config);
    let result = runtime.block_on(async {
        // the repository falls back to an empty list, so surface a broken file here
        store.inspect().await.map_err(|error| error.to_string())?;
        JsonFeedbackRepository::new(store.clone())
            .list_newest_first(limit)
            .await
            .map_err(|error| error.to_string())
    });

    let records = match result {
        Ok(records) => records,
        Err(message) => return CommandResult::failure("feedback", "store", message, EXIT_STORE),
    };
    match serde_json::to_value(&records) {
        Ok(data) => CommandResult::success_with_data(
            "feedback",
            format!("{} feedback record(s), newest first", records.len()),
            Some(data),
        ),
        Err(error) => {
            CommandResult::failure("feedback", "serialization", error.to_string(), EXIT_STORE)
        }
    }
}
