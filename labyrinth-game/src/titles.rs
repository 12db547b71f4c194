//! Player titles earned from meta progression.
use thiserror::Error;

use crate::meta::MetaState;
use crate::progression::{ProgressionCatalog, TitleDef};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TitleError {
    #[error("unknown title `{0}`")]
    Unknown(String),
    #[error("title `{0}` has not been earned yet")]
    NotEarned(String),
}

/// Every title the meta-state currently qualifies for, in catalog order.
#[must_use]
pub fn unlocked_titles<'a>(meta: &MetaState, catalog: &'a ProgressionCatalog) -> Vec<&'a TitleDef> {
    catalog
        .titles()
        .iter()
        .filter(|title| title.is_earned(meta))
        .collect()
}

/// Title to display: the selected one while still earned, else the last earned one,
/// else the first catalog title.
#[must_use]
pub fn active_title<'a>(meta: &MetaState, catalog: &'a ProgressionCatalog) -> Option<&'a TitleDef> {
    let earned = unlocked_titles(meta, catalog);
    meta.title
        .as_deref()
        .and_then(|selected| earned.iter().copied().find(|title| title.id == selected))
        .or_else(|| earned.last().copied())
        .or_else(|| catalog.titles().first())
}

/// Select a title for display.
///
/// # Errors
///
/// Fails for unknown titles and titles the meta-state has not earned.
pub fn select_title(meta: &mut MetaState, catalog: &ProgressionCatalog, id: &str) -> Result<(), TitleError> {
    let title = catalog
        .title(id)
        .ok_or_else(|| TitleError::Unknown(id.to_string()))?;
    if !title.is_earned(meta) {
        return Err(TitleError::NotEarned(id.to_string()));
    }
    meta.title = Some(title.id.clone());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endings::EndingDef;
    use crate::meta::MetaPredicate;
    use crate::progression::fixtures::difficulty;

    fn title(id: &str, requires: Option<MetaPredicate>) -> TitleDef {
        TitleDef {
            id: id.into(),
            name: id.into(),
            requires,
        }
    }

    fn catalog() -> ProgressionCatalog {
        ProgressionCatalog::from_parts(
            vec![difficulty("normal", 0, 0, -1, 1.0)],
            Vec::new(),
            vec![EndingDef {
                id: "standard".into(),
                name: "Survivor".into(),
                description: String::new(),
                bonus_kp: 0,
                criteria: Vec::new(),
            }],
            vec![
                title("t00", None),
                title("t01", Some(MetaPredicate::MinRuns(1))),
                title("t06", Some(MetaPredicate::MinEscapes(1))),
                title("t11", Some(MetaPredicate::DifficultyCleared("normal".into()))),
            ],
        )
        .unwrap()
    }

    #[test]
    fn earned_titles_follow_meta() {
        let catalog = catalog();
        let mut meta = MetaState::default();
        let ids = |meta: &MetaState| -> Vec<String> {
            unlocked_titles(meta, &catalog).iter().map(|t| t.id.clone()).collect()
        };
        assert_eq!(ids(&meta), vec!["t00"]);
        meta.runs = 1;
        meta.escapes = 1;
        assert_eq!(ids(&meta), vec!["t00", "t01", "t06"]);
    }

    #[test]
    fn active_title_prefers_valid_selection() {
        let catalog = catalog();
        let mut meta = MetaState {
            runs: 2,
            escapes: 1,
            ..MetaState::default()
        };
        assert_eq!(active_title(&meta, &catalog).unwrap().id, "t06");

        select_title(&mut meta, &catalog, "t01").unwrap();
        assert_eq!(active_title(&meta, &catalog).unwrap().id, "t01");

        meta.runs = 0;
        assert_eq!(active_title(&meta, &catalog).unwrap().id, "t06");
    }

    #[test]
    fn selection_is_validated() {
        let catalog = catalog();
        let mut meta = MetaState::default();
        assert_eq!(
            select_title(&mut meta, &catalog, "t99"),
            Err(TitleError::Unknown("t99".into()))
        );
        assert_eq!(
            select_title(&mut meta, &catalog, "t11"),
            Err(TitleError::NotEarned("t11".into()))
        );
        assert_eq!(meta.title, None);
    }
}
