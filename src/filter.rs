//! Pure search/filter composition over a loaded entry list.
//!
//! The engine owns no state: callers re-run it whenever the list or the
//! spec changes. Input order is preserved (the repository already returns
//! entries newest-first); nothing here re-sorts.

use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{DiaryEntry, Emotion};

/// Transient filter specification. Blank strings and `None` fields are
/// inactive; active predicates are combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub keyword: String,
    pub username: String,
    pub emotion: Option<Emotion>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.keyword.trim().is_empty()
            && self.username.trim().is_empty()
            && self.emotion.is_none()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }

    fn matches(&self, entry: &DiaryEntry) -> bool {
        let keyword = self.keyword.trim();
        if !keyword.is_empty()
            && !entry
                .content
                .to_lowercase()
                .contains(&keyword.to_lowercase())
        {
            return false;
        }

        let username = self.username.trim();
        if !username.is_empty() {
            // an anonymous entry never matches a username search
            match &entry.nickname {
                Some(n) if n.to_lowercase().contains(&username.to_lowercase()) => {}
                _ => return false,
            }
        }

        if let Some(tag) = self.emotion {
            if entry.emotion != Some(tag) {
                return false;
            }
        }

        if self.date_from.is_some() || self.date_to.is_some() {
            // a date bound can only match a timestamped entry
            let Some(created) = entry.created_at else {
                return false;
            };
            let created = created.naive_utc();
            if let Some(from) = self.date_from {
                if created < day_start(from) {
                    return false;
                }
            }
            if let Some(to) = self.date_to {
                if created > day_end(to) {
                    return false;
                }
            }
        }

        true
    }
}

// Bounds are inclusive: 00:00:00.000 through 23:59:59.999 of the named day.
fn day_start(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_opt(0, 0, 0).unwrap()
}

fn day_end(d: NaiveDate) -> NaiveDateTime {
    d.and_hms_milli_opt(23, 59, 59, 999).unwrap()
}

/// Reduce `entries` to the subset matching `spec`, preserving order.
pub fn apply_filters(mut entries: Vec<DiaryEntry>, spec: &FilterSpec) -> Vec<DiaryEntry> {
    if spec.is_empty() {
        return entries;
    }
    entries.retain(|e| spec.matches(e));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn entry(nickname: Option<&str>, content: &str, emotion: Option<Emotion>) -> DiaryEntry {
        DiaryEntry {
            id: Uuid::new_v4(),
            user_id: None,
            nickname: nickname.map(Into::into),
            content: content.into(),
            emotion,
            created_at: Some(Utc::now()),
            is_public: true,
        }
    }

    fn at(entry: DiaryEntry, ts: DateTime<Utc>) -> DiaryEntry {
        DiaryEntry {
            created_at: Some(ts),
            ..entry
        }
    }

    fn sample() -> Vec<DiaryEntry> {
        vec![
            entry(Some("太郎"), "今日は久しぶりに友達と会えて本当に楽しかった！", None),
            entry(None, "最近仕事が忙しすぎて疲れが取れない...", Some(Emotion::Sadness)),
            entry(Some("みかん"), "映画館で見た新作アニメが最高だった！", Some(Emotion::Joy)),
        ]
    }

    #[test]
    fn empty_spec_is_identity() {
        let entries = sample();
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        let out = apply_filters(entries, &FilterSpec::default());
        assert_eq!(out.iter().map(|e| e.id).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn whitespace_keyword_is_passthrough() {
        let entries = sample();
        let spec = FilterSpec {
            keyword: "   ".into(),
            ..Default::default()
        };
        assert_eq!(apply_filters(entries, &spec).len(), 3);
    }

    #[test]
    fn keyword_substring_match() {
        let spec = FilterSpec {
            keyword: "友達".into(),
            ..Default::default()
        };
        let out = apply_filters(sample(), &spec);
        assert_eq!(out.len(), 1);
        assert!(out[0].content.contains("友達と会えて"));

        let spec = FilterSpec {
            keyword: "xyz123".into(),
            ..Default::default()
        };
        assert!(apply_filters(sample(), &spec).is_empty());
    }

    #[test]
    fn keyword_is_case_insensitive() {
        let entries = vec![entry(None, "Good DAY at the office", None)];
        let spec = FilterSpec {
            keyword: "good day".into(),
            ..Default::default()
        };
        assert_eq!(apply_filters(entries, &spec).len(), 1);
    }

    #[test]
    fn username_skips_anonymous_entries() {
        let spec = FilterSpec {
            username: "みかん".into(),
            ..Default::default()
        };
        let out = apply_filters(sample(), &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].nickname.as_deref(), Some("みかん"));

        // nickname-less entries must never match a non-empty username filter
        let spec = FilterSpec {
            username: "anonymous".into(),
            ..Default::default()
        };
        assert!(apply_filters(sample(), &spec).is_empty());
    }

    #[test]
    fn emotion_exact_match_excludes_untagged() {
        let spec = FilterSpec {
            emotion: Some(Emotion::Joy),
            ..Default::default()
        };
        let out = apply_filters(sample(), &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].emotion, Some(Emotion::Joy));

        let spec = FilterSpec {
            emotion: Some(Emotion::Fear),
            ..Default::default()
        };
        assert!(apply_filters(sample(), &spec).is_empty());
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let inside = at(
            entry(None, "late", None),
            Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
        );
        let outside = at(
            entry(None, "next month", None),
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        let spec = FilterSpec {
            date_from: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            date_to: Some(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            ..Default::default()
        };
        let out = apply_filters(vec![inside.clone(), outside], &spec);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, inside.id);
    }

    #[test]
    fn date_bound_excludes_timestampless_entries() {
        let mut e = entry(None, "no timestamp", None);
        e.created_at = None;
        let spec = FilterSpec {
            date_from: Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            ..Default::default()
        };
        assert!(apply_filters(vec![e.clone()], &spec).is_empty());
        // without a bound the same entry passes
        assert_eq!(apply_filters(vec![e], &FilterSpec::default()).len(), 1);
    }

    #[test]
    fn predicates_combine_with_and() {
        let spec = FilterSpec {
            keyword: "アニメ".into(),
            username: "みかん".into(),
            emotion: Some(Emotion::Joy),
            ..Default::default()
        };
        assert_eq!(apply_filters(sample(), &spec).len(), 1);

        let spec = FilterSpec {
            keyword: "アニメ".into(),
            emotion: Some(Emotion::Sadness),
            ..Default::default()
        };
        assert!(apply_filters(sample(), &spec).is_empty());
    }

    #[test]
    fn order_is_preserved() {
        let a = at(
            entry(Some("a"), "おはよう", None),
            Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap(),
        );
        let b = at(
            entry(Some("b"), "おはようございます", None),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        );
        let spec = FilterSpec {
            keyword: "おはよう".into(),
            ..Default::default()
        };
        let out = apply_filters(vec![a.clone(), b.clone()], &spec);
        assert_eq!(out[0].id, a.id);
        assert_eq!(out[1].id, b.id);
    }
}
