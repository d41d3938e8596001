//! Localized user-facing message templates.

/// Message locale, selected by the `LANGUAGE` configuration key.
///
/// Chat members only ever see two messages from the bot besides the flyer
/// images themselves: the per-thread "no flyers" notice and the end-of-run
/// summary. Both live here so adding a locale is a single match arm away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locale {
    En,
    No,
}

impl Locale {
    pub const DEFAULT: Locale = Locale::En;

    /// Look up a locale by its configuration key (`"en"`, `"no"`).
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "en" => Some(Locale::En),
            "no" => Some(Locale::No),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::No => "no",
        }
    }

    /// Posted into a store thread when the scrape produced no usable images.
    pub fn no_flyers(&self) -> &'static str {
        match self {
            Locale::En => "No flyer images found.",
            Locale::No => "Ingen tilbudsaviser funnet.",
        }
    }

    /// End-of-run summary for the parent channel. `threads` is a
    /// newline-joined list of thread mentions in store order.
    pub fn summary(&self, week_number: u32, threads: &str) -> String {
        match self {
            Locale::En => format!(
                "This week (week {week_number}), check out the latest flyers:\n\n{threads}"
            ),
            Locale::No => format!(
                "Denne uken (uke {week_number}) er det massive mengder nam nam. Sjekk tilbudsavisene:\n\n{threads}"
            ),
        }
    }
}
