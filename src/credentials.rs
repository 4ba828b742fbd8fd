//! Exchange API credential resolution from environment variables.

use crate::types::ExchangeCredentials;

/// Looks up `<VENUE>_API_KEY`/`_API_SECRET`/`_API_PASSPHRASE` (uppercased,
/// hyphens replaced with underscores), falling back to `EXCHANGE_API_*`.
pub fn load_exchange_credentials(venue: &str) -> Option<ExchangeCredentials> {
    let prefix = venue.to_uppercase().replace('-', "_");
    let api_key = std::env::var(format!("{prefix}_API_KEY"))
        .or_else(|_| std::env::var("EXCHANGE_API_KEY"))
        .ok()?;
    let secret = std::env::var(format!("{prefix}_API_SECRET"))
        .or_else(|_| std::env::var("EXCHANGE_API_SECRET"))
        .ok()?;
    let passphrase = std::env::var(format!("{prefix}_API_PASSPHRASE"))
        .or_else(|_| std::env::var("EXCHANGE_API_PASSPHRASE"))
        .ok();
    Some(ExchangeCredentials {
        api_key,
        secret,
        passphrase,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_credentials_yields_none() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("KUCOIN_API_KEY");
        std::env::remove_var("EXCHANGE_API_KEY");
        assert!(load_exchange_credentials("kucoin").is_none());
    }

    #[test]
    fn venue_prefixed_vars_take_precedence() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("KUCOIN_API_KEY", "venue-key");
        std::env::set_var("KUCOIN_API_SECRET", "venue-secret");
        let creds = load_exchange_credentials("kucoin").unwrap();
        assert_eq!(creds.api_key, "venue-key");
        assert_eq!(creds.secret, "venue-secret");
        std::env::remove_var("KUCOIN_API_KEY");
        std::env::remove_var("KUCOIN_API_SECRET");
    }

    #[test]
    fn hyphenated_venue_name_normalizes_to_underscore() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("MY_VENUE_API_KEY", "k");
        std::env::set_var("MY_VENUE_API_SECRET", "s");
        let creds = load_exchange_credentials("my-venue").unwrap();
        assert_eq!(creds.api_key, "k");
        std::env::remove_var("MY_VENUE_API_KEY");
        std::env::remove_var("MY_VENUE_API_SECRET");
    }
}
