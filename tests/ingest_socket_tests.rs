use anyhow::Result;
use std::io::Write;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use whowas::daemon::coordinator::Daemon;
use whowas_common::config::AppConfig;
use whowas_common::paths;
use whowas_core::classify::GatewayEvent;
use whowas_core::records::{Category, MemberSnapshot, Presence};
use whowas_storage::HistoryStore;
use whowas_storage::sqlite3::SqliteHistoryStore;

fn member(uid: i64, sid: i64) -> MemberSnapshot {
    MemberSnapshot {
        uid,
        sid,
        name: format!("user-{uid}"),
        tag: "0001".to_string(),
        nick: None,
        status: Presence::Offline,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[test]
fn ndjson_lines_feed_the_pending_queues() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(SqliteHistoryStore::open(dir.path().join("history.db"))?);
    let dyn_store: Arc<dyn HistoryStore> = store.clone();
    let config = AppConfig {
        workspace_dir: dir.path().to_path_buf(),
        flush_interval_secs: 60,
        compact_threshold: 20_000,
    };

    let daemon = Daemon::start(dyn_store, &config)?;
    let _server = daemon.serve_socket(dir.path())?;

    let mut stream = UnixStream::connect(paths::ingest_socket(dir.path()))?;
    let snapshot = serde_json::to_string(&GatewayEvent::Snapshot {
        members: vec![member(1, 10)],
    })?;
    writeln!(stream, "{snapshot}")?;
    assert!(daemon.gate().wait_timeout(Duration::from_secs(5)));

    // A malformed line is discarded without wedging the connection.
    writeln!(stream, "{{not valid json")?;

    let join = serde_json::to_string(&GatewayEvent::MemberJoin {
        member: member(2, 10),
        mutual_spaces: 1,
    })?;
    writeln!(stream, "{join}")?;

    let queues = daemon.queues();
    assert!(wait_until(|| queues.len(Category::Nicks) >= 2));
    assert!(wait_until(|| queues.len(Category::Names) >= 2));

    daemon.shutdown()?;

    assert_eq!(store.count_rows(Category::Names)?, 2);
    assert_eq!(store.fetch_values(Category::Names, 2)?.len(), 1);
    Ok(())
}
