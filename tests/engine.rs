use lognote::config::Config;
use lognote::engine::{Command, Engine};
use lognote::filter::LevelSet;
use lognote::group::Selection;
use lognote::loader::{LoadEvent, LoadKind, Snapshot};
use lognote::record::LogLevel;
use lognote::viewport::TextSink;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;

const NOTIFICATION_A: &str = r#"2024.05.01 20:00:00 Log        -  Received Notification: {"id":"not_1","created_at":"2024-05-01T19:59:58Z","details":{"groupId":"grp_a","groupName":"Tea Club","message":"Meeting at 9"}}"#;
const NOTIFICATION_B: &str = r#"2024.05.01 20:05:00 Log        -  Received Notification: {"id":"not_2","created_at":"2024-05-01T20:04:58Z","details":{"groupId":"grp_b","message":"Shop opens"}}"#;
const NOTIFICATION_A2: &str = r#"2024.05.01 20:10:00 Log        -  Received Notification: {"id":"not_3","created_at":"2024-05-01T20:09:58Z","details":{"groupId":"grp_a","message":"Meeting moved"}}"#;

struct Fixture {
    dir: TempDir,
    log: PathBuf,
    engine: Engine,
    events: mpsc::UnboundedReceiver<LoadEvent>,
}

impl Fixture {
    fn new(content: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("output_log.txt");
        fs::write(&log, content).unwrap();

        let mut config = Config::default();
        config.overrides_path = Some(overrides_file(dir.path()).to_string_lossy().into_owned());
        let (tx, events) = mpsc::unbounded_channel();
        let engine = Engine::new(log.clone(), &config, tx).unwrap();
        Self {
            dir,
            log,
            engine,
            events,
        }
    }

    fn append(&self, text: &str) {
        self.append_bytes(text.as_bytes());
    }

    fn append_bytes(&self, bytes: &[u8]) {
        let mut file = OpenOptions::new().append(true).open(&self.log).unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
    }

    async fn next_event(&mut self) -> LoadEvent {
        timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("engine did not answer")
            .expect("event channel closed")
    }

    /// Handles events until a load finishes and the display list it causes
    /// is installed. Returns whether the display changed.
    async fn settle(&mut self) -> bool {
        let mut changed = false;
        let mut loaded = false;
        while !loaded || self.engine.status().filtering {
            let event = self.next_event().await;
            loaded |= matches!(event, LoadEvent::Loaded(_) | LoadEvent::Failed { .. });
            changed |= self.engine.handle_event(event);
        }
        changed
    }

    /// Handles events until the latest filter pass is installed.
    async fn filtered(&mut self) {
        while self.engine.status().filtering {
            let event = self.next_event().await;
            self.engine.handle_event(event);
        }
    }

    async fn load(&mut self) {
        self.engine.reload();
        assert!(self.settle().await);
    }

    fn raw_lines(&self) -> Vec<String> {
        self.engine.records().iter().map(|r| r.raw.clone()).collect()
    }
}

fn overrides_file(dir: &Path) -> PathBuf {
    dir.join("group_names.json")
}

fn lines(n: usize, prefix: &str) -> String {
    (0..n).map(|i| format!("{} {}\n", prefix, i)).collect()
}

#[tokio::test]
async fn test_full_load_collapses_tagged_run() {
    let content: String = (0..5)
        .map(|i| format!("2024.01.01 10:00:0{} Log        -  [Network] packet {}\n", i, i))
        .collect();
    let mut fx = Fixture::new(&content);
    fx.load().await;

    let display = fx.engine.display();
    assert_eq!(fx.engine.records().len(), 5);
    assert_eq!(display.len(), 6);
    assert_eq!(display.records()[0].content, "[Network] 5 件のログ");
    assert_eq!(display.records()[0].member_count, Some(5));
    assert!(!fx.engine.status().loading);
}

#[tokio::test]
async fn test_tailing_a_growing_file_appends_in_order() {
    let mut fx = Fixture::new(&lines(2, "first"));
    fx.load().await;
    assert_eq!(fx.raw_lines(), vec!["first 0", "first 1"]);

    fx.append(&lines(2, "second"));
    fx.engine.tail_check();
    assert!(fx.settle().await);
    assert_eq!(
        fx.raw_lines(),
        vec!["first 0", "first 1", "second 0", "second 1"]
    );

    fx.engine.tail_check();
    assert!(!fx.settle().await);
    assert_eq!(fx.engine.records().len(), 4);
}

#[tokio::test]
async fn test_unterminated_line_is_completed_by_next_append() {
    let mut fx = Fixture::new("done\n");
    fx.load().await;

    fx.append("part");
    fx.engine.tail_check();
    fx.settle().await;
    assert_eq!(fx.raw_lines(), vec!["done", "part"]);

    fx.append("ial\nnext\n");
    fx.engine.tail_check();
    fx.settle().await;
    assert_eq!(fx.raw_lines(), vec!["done", "partial", "next"]);
}

#[tokio::test]
async fn test_rotation_reloads_whole_file() {
    let mut fx = Fixture::new(&lines(10, "old line with some padding"));
    fx.load().await;
    assert_eq!(fx.engine.records().len(), 10);

    fs::write(&fx.log, "fresh\n").unwrap();
    fx.engine.tail_check();
    assert!(fx.settle().await);
    assert_eq!(fx.raw_lines(), vec!["fresh"]);
}

#[tokio::test]
async fn test_stale_snapshot_is_dropped() {
    let mut fx = Fixture::new(&lines(3, "line"));
    fx.load().await;
    let first = fx.engine.generation();

    fx.engine.reload();
    let stale = Snapshot {
        generation: first,
        kind: LoadKind::Full,
        records: Vec::new(),
        notifications: Vec::new(),
        groups: None,
        replaces_last: false,
        offset: 0,
    };
    assert!(!fx.engine.install(stale));
    assert_eq!(fx.engine.records().len(), 3);

    assert!(fx.settle().await);
    assert_eq!(fx.engine.generation(), first + 1);
    assert_eq!(fx.engine.records().len(), 3);
}

#[tokio::test]
async fn test_tail_check_waits_for_first_load() {
    let mut fx = Fixture::new("a\n");
    fx.engine.tail_check();
    assert!(fx.events.try_recv().is_err());

    fx.load().await;
    assert_eq!(fx.raw_lines(), vec!["a"]);
}

#[tokio::test]
async fn test_missing_file_reports_load_error() {
    let mut fx = Fixture::new("");
    fs::remove_file(&fx.log).unwrap();
    fx.engine.reload();
    assert!(!fx.settle().await);
    assert!(fx.engine.status().load_error.is_some());
    assert!(!fx.engine.status().loading);
}

#[tokio::test]
async fn test_notifications_are_grouped_and_appended() {
    let mut fx = Fixture::new(&format!("{}\n{}\n", NOTIFICATION_A, NOTIFICATION_B));
    fx.load().await;
    assert_eq!(fx.engine.groups().len(), 2);
    assert_eq!(fx.engine.groups().get("grp_a").unwrap().display_name, "Tea Club");

    fx.append(&format!("{}\n", NOTIFICATION_A2));
    fx.engine.tail_check();
    fx.settle().await;

    let sorted = fx.engine.groups().list_sorted_by_message_count_desc();
    assert_eq!(sorted[0].group_id, "grp_a");
    assert_eq!(sorted[0].message_count(), 2);
    assert_eq!(fx.engine.groups().total_messages(), 3);
}

#[tokio::test]
async fn test_rename_persists_across_reload() {
    let mut fx = Fixture::new(&format!("{}\n{}\n", NOTIFICATION_A, NOTIFICATION_B));
    fx.load().await;

    fx.engine
        .dispatch(Command::Rename {
            group_id: "grp_a".to_string(),
            name: "Tea Friends".to_string(),
        })
        .unwrap();
    let stored = fs::read_to_string(overrides_file(fx.dir.path())).unwrap();
    assert!(stored.contains("Tea Friends"));

    fx.load().await;
    let ids: Vec<&str> = fx.engine.groups().groups().iter().map(|g| g.group_id.as_str()).collect();
    assert_eq!(ids, vec!["grp_a", "grp_b"]);
    let group = fx.engine.groups().get("grp_a").unwrap();
    assert_eq!(group.display_name, "Tea Friends");
    assert_eq!(group.message_count(), 1);
}

#[tokio::test]
async fn test_rename_unknown_group_is_ignored() {
    let mut fx = Fixture::new(&format!("{}\n", NOTIFICATION_A));
    fx.load().await;
    assert!(!fx.engine.rename("nope", "Name").unwrap());
    assert!(!overrides_file(fx.dir.path()).exists());
}

#[tokio::test]
async fn test_export_lists_groups_and_messages() {
    let mut fx = Fixture::new(&format!("{}\n{}\n{}\n", NOTIFICATION_A, NOTIFICATION_B, NOTIFICATION_A2));
    fx.load().await;

    let batch = fx
        .engine
        .dispatch(Command::Export(Selection::Group("grp_a".to_string())))
        .unwrap()
        .unwrap();
    let messages: Vec<&str> = batch.messages.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(messages, vec!["Meeting at 9", "Meeting moved"]);
    assert_eq!(batch.groups[0].message_count, 2);

    let json = serde_json::to_value(&batch).unwrap();
    assert_eq!(json["messages"][0]["id"], "not_1");
}

#[tokio::test]
async fn test_filter_by_level_and_search() {
    let mut fx = Fixture::new("error disk full\nwarning disk slow\ninfo started\nerror net down\n");
    fx.load().await;

    let mut levels = fx.engine.filter().levels();
    levels.toggle(LogLevel::Warning);
    levels.toggle(LogLevel::Info);
    let config = fx.engine.filter().clone().with_levels(levels);
    fx.engine.dispatch(Command::ApplyFilter(config)).unwrap();
    fx.filtered().await;
    assert_eq!(fx.engine.display().len(), 2);

    let config = fx.engine.filter().clone().with_search(Some("DISK".to_string()));
    fx.engine.apply_filter(config);
    fx.filtered().await;
    let shown: Vec<&str> = fx.engine.display().records().iter().map(|r| r.raw.as_str()).collect();
    assert_eq!(shown, vec!["error disk full"]);
}

#[tokio::test]
async fn test_publish_to_text_sink() {
    let mut fx = Fixture::new("[2024-01-01 10:00:00] [Error] boom\nplain\n");
    fx.load().await;

    let mut sink = TextSink::new(Vec::new());
    fx.engine.publish(&mut sink).unwrap();
    let text = String::from_utf8(sink.into_inner()).unwrap();
    assert!(text.contains("boom"));
    assert!(text.contains("plain"));
    assert_eq!(text.lines().count(), 2);
}

#[tokio::test]
async fn test_statistics_follow_installed_records() {
    let mut fx = Fixture::new(&format!("error a\nerror b\ninfo c\n{}\n", NOTIFICATION_A));
    fx.load().await;
    let stats = fx.engine.statistics();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.count(LogLevel::Error), 2);
    assert_eq!(stats.notifications, 1);
    assert_eq!(stats.groups, 1);
}

#[tokio::test]
async fn test_superseded_filter_pass_is_dropped() {
    let mut fx = Fixture::new("error a\ninfo b\n");
    fx.load().await;
    assert_eq!(fx.engine.display().len(), 2);

    let errors_only = fx
        .engine
        .filter()
        .clone()
        .with_levels([LogLevel::Error].into_iter().collect::<LevelSet>());
    fx.engine.apply_filter(errors_only);
    assert!(fx.engine.status().filtering);
    assert_eq!(fx.engine.display().len(), 2);

    let everything = fx.engine.filter().clone().with_levels(LevelSet::all());
    fx.engine.apply_filter(everything);
    fx.filtered().await;
    assert_eq!(fx.engine.display().len(), 2);
}

#[tokio::test]
async fn test_rename_cleared_during_reload_restores_default_name() {
    let mut fx = Fixture::new(&format!("{}\n", NOTIFICATION_A));
    fx.load().await;
    assert!(fx.engine.rename("grp_a", "Tea Friends").unwrap());

    fx.engine.reload();
    assert!(fx.engine.rename("grp_a", "").unwrap());
    assert!(fx.settle().await);

    let group = fx.engine.groups().get("grp_a").unwrap();
    assert_eq!(group.display_name, "Tea Club");
    assert!(!group.is_renamed());
}

#[tokio::test]
async fn test_undecodable_append_keeps_tailing() {
    let mut fx = Fixture::new("start\n");
    fx.load().await;

    fx.append_bytes(b"bad \xFF byte\n");
    fx.engine.tail_check();
    assert!(fx.settle().await);

    fx.append("正常な行\n");
    fx.engine.tail_check();
    assert!(fx.settle().await);

    assert_eq!(fx.raw_lines(), vec!["start", "bad \u{FFFD} byte", "正常な行"]);
    assert!(fx.engine.status().warning.is_none());
}
