use std::path::{Path, PathBuf};

const HISTORY_DB_NAME: &str = "history.db";
const INGEST_UDS_NAME: &str = "whowas.ingest.sock";
const PID_FILE_NAME: &str = "whowas.pid";

pub fn history_db(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(HISTORY_DB_NAME)
}

pub fn ingest_socket(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(INGEST_UDS_NAME)
}

pub fn pid_file(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(PID_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_land_in_workspace() {
        let ws = Path::new("/tmp/ws");
        assert_eq!(history_db(ws), Path::new("/tmp/ws/history.db"));
        assert_eq!(ingest_socket(ws), Path::new("/tmp/ws/whowas.ingest.sock"));
        assert_eq!(pid_file(ws), Path::new("/tmp/ws/whowas.pid"));
    }
}
