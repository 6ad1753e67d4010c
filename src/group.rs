use crate::notification::{NotificationExtractor, NotificationRecord};
use crate::overrides::GroupNameOverrides;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Notifications sharing a group id.
#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub group_id: String,
    pub display_name: String,
    /// In file order.
    pub messages: Vec<NotificationRecord>,
    /// Name used when no override is set.
    default_name: String,
}

impl GroupRecord {
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn is_renamed(&self) -> bool {
        self.display_name != self.default_name
    }
}

/// Which messages an export covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Group(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GroupSummary {
    pub group_id: String,
    pub name: String,
    pub message_count: usize,
}

/// Everything the export collaborator needs for one selection.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBatch {
    /// Sorted by message count, largest first.
    pub groups: Vec<GroupSummary>,
    pub messages: Vec<NotificationRecord>,
}

/// Override pending persistence after a rename. An empty name clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOverride {
    pub group_id: String,
    pub name: String,
}

/// Groups in first-seen order with an id lookup.
#[derive(Debug, Clone, Default)]
pub struct GroupIndex {
    groups: Vec<GroupRecord>,
    positions: HashMap<String, usize>,
    /// (group, message) pairs in file order.
    sequence: Vec<(usize, usize)>,
}

impl GroupIndex {
    /// Builds a fresh index from every notification of a full load.
    pub fn rebuild(
        notifications: &[NotificationRecord],
        overrides: &GroupNameOverrides,
        extractor: &NotificationExtractor,
    ) -> Self {
        let mut index = GroupIndex::default();
        index.append(notifications, overrides, extractor);
        index
    }

    /// Adds notifications read after the last load.
    pub fn append(
        &mut self,
        notifications: &[NotificationRecord],
        overrides: &GroupNameOverrides,
        extractor: &NotificationExtractor,
    ) {
        for notification in notifications {
            let pos = match self.positions.get(&notification.group_id) {
                Some(&pos) => {
                    let group = &mut self.groups[pos];
                    // A payload name may show up after the group was created.
                    if group.default_name == group.group_id
                        && let Some(name) = &notification.group_name
                    {
                        if !group.is_renamed() {
                            group.display_name = name.clone();
                        }
                        group.default_name = name.clone();
                    }
                    pos
                }
                None => {
                    let default_name = notification
                        .group_name
                        .clone()
                        .or_else(|| {
                            extractor
                                .default_group_name(&notification.group_id)
                                .map(str::to_string)
                        })
                        .unwrap_or_else(|| notification.group_id.clone());
                    let display_name = overrides
                        .get(&notification.group_id)
                        .map(str::to_string)
                        .unwrap_or_else(|| default_name.clone());

                    self.groups.push(GroupRecord {
                        group_id: notification.group_id.clone(),
                        display_name,
                        messages: Vec::new(),
                        default_name,
                    });
                    self.positions
                        .insert(notification.group_id.clone(), self.groups.len() - 1);
                    self.groups.len() - 1
                }
            };

            let group = &mut self.groups[pos];
            group.messages.push(notification.clone());
            self.sequence.push((pos, group.messages.len() - 1));
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn total_messages(&self) -> usize {
        self.sequence.len()
    }

    pub fn get(&self, group_id: &str) -> Option<&GroupRecord> {
        self.positions.get(group_id).map(|&pos| &self.groups[pos])
    }

    /// Groups in first-seen order.
    pub fn groups(&self) -> &[GroupRecord] {
        &self.groups
    }

    /// Sets the display name of a group. Returns the override to persist, or
    /// `None` when the group is unknown.
    pub fn rename(&mut self, group_id: &str, new_name: &str) -> Option<GroupOverride> {
        let pos = *self.positions.get(group_id)?;
        let group = &mut self.groups[pos];
        let name = new_name.trim();
        group.display_name = if name.is_empty() {
            group.default_name.clone()
        } else {
            name.to_string()
        };
        Some(GroupOverride {
            group_id: group_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Resets every display name to its override, or to the default name
    /// when the group has none.
    pub fn apply_overrides(&mut self, overrides: &GroupNameOverrides) {
        for group in &mut self.groups {
            group.display_name = overrides
                .get(&group.group_id)
                .map_or_else(|| group.default_name.clone(), str::to_string);
        }
    }

    /// Largest groups first; equal counts keep first-seen order.
    pub fn list_sorted_by_message_count_desc(&self) -> Vec<&GroupRecord> {
        let mut sorted: Vec<&GroupRecord> = self.groups.iter().collect();
        sorted.sort_by(|a, b| b.message_count().cmp(&a.message_count()));
        sorted
    }

    /// Messages of the selection in file order, without repeats of the same
    /// notification.
    pub fn messages_for(&self, selection: &Selection) -> Vec<&NotificationRecord> {
        let mut seen = HashSet::new();
        match selection {
            Selection::All => self
                .sequence
                .iter()
                .map(|&(g, m)| &self.groups[g].messages[m])
                .filter(|n| seen.insert(dedup_key(*n)))
                .collect(),
            Selection::Group(id) => self
                .get(id)
                .map(|group| {
                    group
                        .messages
                        .iter()
                        .filter(|n| seen.insert(dedup_key(*n)))
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    pub fn export(&self, selection: &Selection) -> ExportBatch {
        ExportBatch {
            groups: self
                .list_sorted_by_message_count_desc()
                .into_iter()
                .map(|g| GroupSummary {
                    group_id: g.group_id.clone(),
                    name: g.display_name.clone(),
                    message_count: g.message_count(),
                })
                .collect(),
            messages: self
                .messages_for(selection)
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

/// Notifications with an id are the same when ids match; others compare by
/// content.
fn dedup_key(n: &NotificationRecord) -> (&str, &str, &str) {
    if n.id.is_empty() {
        (n.group_id.as_str(), n.date.as_str(), n.message.as_str())
    } else {
        (n.id.as_str(), "", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::test_extractor;

    fn note(id: &str, group_id: &str, message: &str) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            group_id: group_id.to_string(),
            group_name: None,
            date: "2024.01.01 10:00:00".to_string(),
            created_at: String::new(),
            message: message.to_string(),
        }
    }

    fn sample() -> Vec<NotificationRecord> {
        vec![
            note("1", "g1", "a"),
            note("2", "g2", "b"),
            note("3", "g2", "c"),
            note("4", "g3", "d"),
            note("5", "g1", "e"),
        ]
    }

    #[test]
    fn test_rebuild_keeps_first_seen_order() {
        let index = GroupIndex::rebuild(&sample(), &GroupNameOverrides::default(), &test_extractor());
        let ids: Vec<&str> = index.groups().iter().map(|g| g.group_id.as_str()).collect();
        assert_eq!(ids, vec!["g1", "g2", "g3"]);
        assert_eq!(index.get("g1").unwrap().display_name, "g1");
        assert_eq!(index.total_messages(), 5);
    }

    #[test]
    fn test_display_name_precedence() {
        let extractor = test_extractor();
        let mut named = note("1", "grp_x", "hi");
        named.group_name = Some("Payload Name".to_string());
        let rule_based = note("2", "group_bar", "開店しました");

        let index = GroupIndex::rebuild(
            &[named.clone(), rule_based.clone()],
            &GroupNameOverrides::default(),
            &extractor,
        );
        assert_eq!(index.get("grp_x").unwrap().display_name, "Payload Name");
        assert_eq!(index.get("group_bar").unwrap().display_name, "🍺 Bar/開店情報");

        let mut overrides = GroupNameOverrides::default();
        overrides.set("grp_x", "Mine");
        let index = GroupIndex::rebuild(&[named, rule_based], &overrides, &extractor);
        assert_eq!(index.get("grp_x").unwrap().display_name, "Mine");
    }

    #[test]
    fn test_rename_then_rebuild_keeps_order_and_count() {
        let extractor = test_extractor();
        let mut overrides = GroupNameOverrides::default();
        let mut index = GroupIndex::rebuild(&sample(), &overrides, &extractor);

        let change = index.rename("g1", "First").unwrap();
        assert_eq!(change.name, "First");
        overrides.set(&change.group_id, &change.name);

        let rebuilt = GroupIndex::rebuild(&sample(), &overrides, &extractor);
        assert_eq!(rebuilt.get("g1").unwrap().display_name, "First");
        assert_eq!(rebuilt.groups()[0].group_id, "g1");
        assert_eq!(rebuilt.len(), index.len());
        assert_eq!(rebuilt.get("g1").unwrap().message_count(), 2);
    }

    #[test]
    fn test_rename_with_empty_name_restores_default() {
        let mut index = GroupIndex::rebuild(&sample(), &GroupNameOverrides::default(), &test_extractor());
        index.rename("g2", "Two");
        assert!(index.get("g2").unwrap().is_renamed());
        let change = index.rename("g2", "  ").unwrap();
        assert!(change.name.is_empty());
        assert_eq!(index.get("g2").unwrap().display_name, "g2");
        assert!(index.rename("missing", "x").is_none());
    }

    #[test]
    fn test_apply_overrides_clears_stale_names() {
        let extractor = test_extractor();
        let mut overrides = GroupNameOverrides::default();
        overrides.set("g1", "Old");
        overrides.set("g3", "Three");
        let mut index = GroupIndex::rebuild(&sample(), &overrides, &extractor);

        overrides.set("g1", "");
        index.apply_overrides(&overrides);
        assert_eq!(index.get("g1").unwrap().display_name, "g1");
        assert!(!index.get("g1").unwrap().is_renamed());
        assert_eq!(index.get("g3").unwrap().display_name, "Three");
    }

    #[test]
    fn test_sorted_by_count_is_stable() {
        let index = GroupIndex::rebuild(&sample(), &GroupNameOverrides::default(), &test_extractor());
        let ids: Vec<&str> = index
            .list_sorted_by_message_count_desc()
            .iter()
            .map(|g| g.group_id.as_str())
            .collect();
        assert_eq!(ids, vec!["g1", "g2", "g3"]);
    }

    #[test]
    fn test_append_extends_existing_groups() {
        let extractor = test_extractor();
        let overrides = GroupNameOverrides::default();
        let mut index = GroupIndex::rebuild(&sample()[..2], &overrides, &extractor);
        index.append(&sample()[2..], &overrides, &extractor);
        let full = GroupIndex::rebuild(&sample(), &overrides, &extractor);
        assert_eq!(index.len(), full.len());
        assert_eq!(
            index.messages_for(&Selection::All),
            full.messages_for(&Selection::All)
        );
    }

    #[test]
    fn test_messages_for_is_ordered_and_deduplicated() {
        let mut notes = sample();
        notes.push(note("2", "g2", "b"));
        let index = GroupIndex::rebuild(&notes, &GroupNameOverrides::default(), &test_extractor());

        let all: Vec<&str> = index
            .messages_for(&Selection::All)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(all, vec!["1", "2", "3", "4", "5"]);

        let g2 = index.messages_for(&Selection::Group("g2".to_string()));
        assert_eq!(g2.len(), 2);
        assert!(index.messages_for(&Selection::Group("nope".to_string())).is_empty());
    }

    #[test]
    fn test_export_batch_serializes() {
        let index = GroupIndex::rebuild(&sample(), &GroupNameOverrides::default(), &test_extractor());
        let batch = index.export(&Selection::Group("g1".to_string()));
        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.groups[0].message_count, 2);
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["messages"][1]["message"], "e");
    }
}
