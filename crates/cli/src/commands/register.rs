use crate::commands::CommandResult;
use mailbrief_core::config::{AppConfig, LoadOptions};
use mailbrief_discord::commands::command_definitions;
use mailbrief_discord::RestDelivery;

/// Pushes the slash command set to Discord, replacing whatever was there.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "register-commands",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "register-commands",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let delivery = RestDelivery::new(&config.discord)
            .map_err(|error| ("discord_client", error.to_string(), 4u8))?;
        delivery
            .register_commands(&command_definitions())
            .await
            .map_err(|error| ("registration", error.to_string(), 5u8))
    });

    match result {
        Ok(registered) => CommandResult::success(
            "register-commands",
            format!(
                "registered {registered} command(s) for application {}",
                config.discord.application_id
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("register-commands", error_class, message, exit_code)
        }
    }
}
