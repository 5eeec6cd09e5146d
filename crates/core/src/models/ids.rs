//! Identifier generation for board items

use chrono::Utc;
use rand::Rng;

/// Generate an id of the form `<prefix>-<unix millis>-<9 base-36 chars>`
pub fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| std::char::from_digit(rng.gen_range(0..36), 36).unwrap_or('0'))
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix)
}
