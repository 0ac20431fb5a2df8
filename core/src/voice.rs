//! Local voice selection with memoization.

use crate::narrator::{LocalNarrator, Voice};
use parking_lot::Mutex;
use tracing::debug;

/// Pick the best voice for `lang` (e.g. `pt-BR`).
///
/// An exact language match wins (case and `_`/`-` insensitive); otherwise the
/// first voice whose tag contains the primary subtag (`pt`). `None` means the
/// platform default should be used.
pub fn select_voice(voices: &[Voice], lang: &str) -> Option<Voice> {
    let wanted = canonical_tag(lang);
    let primary = wanted.split('-').next().unwrap_or_default().to_string();

    voices
        .iter()
        .find(|v| canonical_tag(&v.lang) == wanted)
        .or_else(|| {
            voices
                .iter()
                .find(|v| !primary.is_empty() && canonical_tag(&v.lang).contains(&primary))
        })
        .cloned()
}

fn canonical_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Memoized best voice; only a successful match is remembered, so an empty
/// voice list is re-queried on the next request.
pub struct VoiceSelector {
    lang: String,
    memo: Mutex<Option<Voice>>,
}

impl VoiceSelector {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            memo: Mutex::new(None),
        }
    }

    pub fn best_voice(&self, narrator: &dyn LocalNarrator) -> Option<Voice> {
        let mut memo = self.memo.lock();
        if memo.is_none() {
            *memo = select_voice(&narrator.voices(), &self.lang);
            if let Some(v) = memo.as_ref() {
                debug!(target: "narration", voice = %v.name, lang = %v.lang, "Resolved local voice");
            }
        }
        memo.clone()
    }

    pub fn invalidate(&self) {
        *self.memo.lock() = None;
    }

    /// Invalidate and eagerly resolve again.
    pub fn refresh(&self, narrator: &dyn LocalNarrator) -> Option<Voice> {
        self.invalidate();
        self.best_voice(narrator)
    }

    pub fn current(&self) -> Option<Voice> {
        self.memo.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrator::MockLocalNarrator;

    fn voices() -> Vec<Voice> {
        vec![
            Voice::new("English", "en-US"),
            Voice::new("Portuguese_(Portugal)", "pt"),
            Voice::new("Portuguese_(Brazil)", "pt-br"),
        ]
    }

    #[test]
    fn prefers_exact_tag() {
        let v = select_voice(&voices(), "pt-BR").unwrap();
        assert_eq!(v.name, "Portuguese_(Brazil)");
    }

    #[test]
    fn falls_back_to_first_portuguese() {
        let list = vec![Voice::new("English", "en"), Voice::new("Luciana", "pt_PT")];
        let v = select_voice(&list, "pt-BR").unwrap();
        assert_eq!(v.name, "Luciana");
    }

    #[test]
    fn no_match_is_none() {
        assert!(select_voice(&[Voice::new("English", "en-US")], "pt-BR").is_none());
        assert!(select_voice(&[], "pt-BR").is_none());
    }

    #[test]
    fn memoizes_until_invalidated() {
        let mut narrator = MockLocalNarrator::new();
        narrator.expect_voices().times(2).returning(voices);

        let selector = VoiceSelector::new("pt-BR");
        assert_eq!(selector.best_voice(&narrator).unwrap().lang, "pt-br");
        assert_eq!(selector.best_voice(&narrator).unwrap().lang, "pt-br");
        assert!(selector.refresh(&narrator).is_some());
    }

    #[test]
    fn empty_list_is_requeried() {
        let mut narrator = MockLocalNarrator::new();
        let mut calls = 0;
        narrator.expect_voices().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Vec::new()
            } else {
                voices()
            }
        });

        let selector = VoiceSelector::new("pt-BR");
        assert!(selector.best_voice(&narrator).is_none());
        assert!(selector.best_voice(&narrator).is_some());
        assert!(selector.current().is_some());
    }
}
