//! Fuzz test for channel settings parsing
//!
//! Arbitrary TOML must either be rejected or produce settings that can be
//! pushed through the option store without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use rudt_transport::{ChannelSettings, TransportChannelConfig};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _: Result<toml::Value, _> = toml::from_str(s);

        if let Ok(settings) = ChannelSettings::from_toml_str(s) {
            let config = TransportChannelConfig::detached();
            let _ = settings.apply_to(&config);

            // Anything that parsed must serialize back.
            let encoded = settings.to_toml_string().expect("settings encode");
            let decoded = ChannelSettings::from_toml_str(&encoded).expect("settings decode");
            assert_eq!(decoded, settings);
        }
    }
});
