use mudey_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;

/// Prints the effective configuration with secrets redacted.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line("database.url", &config.database.url));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
    ));
    lines.push(render_line("database.timeout_secs", &config.database.timeout_secs.to_string()));

    lines.push(render_line(
        "channel.access_token",
        &redact(config.channel.access_token.expose_secret()),
    ));
    lines.push(render_line("channel.phone_number_id", &config.channel.phone_number_id));
    lines.push(render_line("channel.api_base_url", &config.channel.api_base_url));

    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact(key.expose_secret()))
        .unwrap_or_else(|| "(unset)".to_string());
    lines.push(render_line("llm.api_key", &api_key));
    lines.push(render_line("llm.model", &config.llm.model));
    lines.push(render_line("llm.timeout_secs", &config.llm.timeout_secs.to_string()));
    lines.push(render_line("llm.temperature", &config.llm.temperature.to_string()));

    lines.push(render_line("email.from_address", &config.email.from_address));
    lines.push(render_line("email.from_name", &config.email.from_name));
    let providers = config
        .email
        .providers
        .iter()
        .map(|provider| provider.kind())
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(render_line(
        "email.providers",
        if providers.is_empty() { "(none)" } else { providers.as_str() },
    ));

    let shortener_providers = config
        .shortener
        .providers
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(render_line("shortener.providers", &shortener_providers));
    lines.push(render_line(
        "shortener.threshold_chars",
        &config.shortener.threshold_chars.to_string(),
    ));
    lines.push(render_line("shortener.portal_base_url", &config.shortener.portal_base_url));

    lines.push(render_line("dispatch.batch_size", &config.dispatch.batch_size.to_string()));
    lines.push(render_line("dispatch.max_attempts", &config.dispatch.max_attempts.to_string()));
    lines.push(render_line(
        "dispatch.inter_batch_delay_ms",
        &config.dispatch.inter_batch_delay_ms.to_string(),
    ));
    lines.push(render_line(
        "dispatch.sweep_interval_secs",
        &config.dispatch.sweep_interval_secs.to_string(),
    ));

    lines.push(render_line(
        "intake.session_ttl_minutes",
        &config.intake.session_ttl_minutes.to_string(),
    ));
    lines.push(render_line(
        "intake.duplicate_window_minutes",
        &config.intake.duplicate_window_minutes.to_string(),
    ));

    lines.push(render_line("logging.level", &config.logging.level));

    lines.join("\n")
}

fn render_line(key: &str, value: &str) -> String {
    format!("  {key} = {value}")
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "(unset)".to_string();
    }
    if secret.len() <= 4 {
        return "****".to_string();
    }
    format!("{}****", &secret[..4])
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn redaction_keeps_only_a_short_prefix() {
        assert_eq!(redact(""), "(unset)");
        assert_eq!(redact("abc"), "****");
        assert_eq!(redact("sk-verylongsecret"), "sk-v****");
    }
}
