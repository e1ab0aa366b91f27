//! Persisted per-session coordinator identity.
//!
//! One JSON record per session at
//! `<config-dir>/crewmux/sessions/<session>/agent.json`, written atomically
//! (temp file in the same directory, then rename). Files are 0644,
//! directories 0755.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoordinatorError;
use crate::mail::{register_with_disambiguation, MailService, RegisterAgentOptions};

/// Session names become path components and agent-name fragments:
/// lowercase, non-alphanumerics collapsed to single underscores.
pub fn sanitize_session_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Registered agent identity for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAgentInfo {
    pub agent_name: String,
    pub project_key: String,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Path to a session's agent.json under the user config dir.
pub fn session_agent_path(session: &str) -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    session_agent_path_in(&base, session)
}

/// Same, rooted at an explicit base directory (used by tests).
pub fn session_agent_path_in(base: &Path, session: &str) -> PathBuf {
    base.join("crewmux")
        .join("sessions")
        .join(sanitize_session_name(session))
        .join("agent.json")
}

/// Load the agent info for a session; `None` when nothing is registered.
pub fn load_session_agent_from(
    base: &Path,
    session: &str,
) -> Result<Option<SessionAgentInfo>, CoordinatorError> {
    let path = session_agent_path_in(base, session);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let info: SessionAgentInfo = serde_json::from_slice(&data)
        .map_err(|e| CoordinatorError::MalformedInput(format!("{}: {e}", path.display())))?;
    Ok(Some(info))
}

/// Save the agent info atomically: write a temp file next to the target,
/// then rename over it.
pub fn save_session_agent_in(
    base: &Path,
    session: &str,
    info: &SessionAgentInfo,
) -> Result<(), CoordinatorError> {
    let path = session_agent_path_in(base, session);
    let dir = path.parent().expect("agent.json always has a parent");
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    set_dir_permissions(base, dir)?;

    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(info)?;
    fs::write(&tmp, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o644))?;
    }
    fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(base: &Path, leaf: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut dir = leaf;
    while dir.starts_with(base) && dir != base {
        fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
        dir = match dir.parent() {
            Some(parent) => parent,
            None => break,
        };
    }
    Ok(())
}

/// Remove the persisted record; absent files are fine.
pub fn delete_session_agent_in(base: &Path, session: &str) -> Result<(), CoordinatorError> {
    let path = session_agent_path_in(base, session);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Load-or-create the coordinator's identity for a session, rooted at the
/// user config dir. With a mail service the name is registered remotely
/// (disambiguating on conflict); without one the identity is local-only.
pub fn register_session_agent(
    mail: Option<&dyn MailService>,
    session: &str,
    project_key: &str,
    now: DateTime<Utc>,
) -> Result<SessionAgentInfo, CoordinatorError> {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    register_session_agent_in(mail, &base, session, project_key, now)
}

/// Same, rooted at an explicit base directory.
pub fn register_session_agent_in(
    mail: Option<&dyn MailService>,
    base: &Path,
    session: &str,
    project_key: &str,
    now: DateTime<Utc>,
) -> Result<SessionAgentInfo, CoordinatorError> {
    // An identity already registered for this project is reused, so a
    // coordinator restart keeps its mail name instead of minting a new
    // one every run.
    if let Some(existing) = load_session_agent_from(base, session)? {
        if existing.project_key == project_key {
            let mut info = existing;
            info.last_active_at = now;
            save_session_agent_in(base, session, &info)?;
            if let Some(mail) = mail {
                // Re-register under the same name to refresh server-side
                // activity; the local identity stands either way.
                if let Err(e) =
                    mail.register_agent(&register_opts(project_key, &info.agent_name, session))
                {
                    warn!(session = %session, error = %e, "mail re-registration failed");
                }
            }
            return Ok(info);
        }
    }

    let mut agent_name = format!("crewmux_{}", sanitize_session_name(session));
    if let Some(mail) = mail {
        agent_name = register_with_disambiguation(
            mail,
            &register_opts(project_key, &agent_name, session),
            now,
        )?;
    }

    let info = SessionAgentInfo {
        agent_name,
        project_key: project_key.to_string(),
        registered_at: now,
        last_active_at: now,
    };
    save_session_agent_in(base, session, &info)?;
    Ok(info)
}

/// Bump the persisted identity's last-active timestamp. No-op when the
/// session has no identity on disk.
pub fn update_session_activity(session: &str, now: DateTime<Utc>) -> Result<(), CoordinatorError> {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    update_session_activity_in(&base, session, now)
}

/// Same, rooted at an explicit base directory.
pub fn update_session_activity_in(
    base: &Path,
    session: &str,
    now: DateTime<Utc>,
) -> Result<(), CoordinatorError> {
    if let Some(mut info) = load_session_agent_from(base, session)? {
        info.last_active_at = now;
        save_session_agent_in(base, session, &info)?;
    }
    Ok(())
}

fn register_opts(project_key: &str, name: &str, session: &str) -> RegisterAgentOptions {
    RegisterAgentOptions {
        project_key: project_key.to_string(),
        program: "crewmux".into(),
        model: "coordinator".into(),
        name: name.to_string(),
        task_description: format!("crewmux session coordinator for {session}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::SendMessageOptions;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records registration attempts; optionally rejects the first name.
    struct RecordingMail {
        attempts: Mutex<Vec<String>>,
        conflict_on_first: bool,
    }

    impl RecordingMail {
        fn new(conflict_on_first: bool) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                conflict_on_first,
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().expect("lock").clone()
        }
    }

    impl MailService for RecordingMail {
        fn send_message(&self, _opts: &SendMessageOptions) -> Result<String, CoordinatorError> {
            Ok("msg-1".into())
        }

        fn register_agent(&self, opts: &RegisterAgentOptions) -> Result<String, CoordinatorError> {
            let mut attempts = self.attempts.lock().expect("lock");
            attempts.push(opts.name.clone());
            if self.conflict_on_first && attempts.len() == 1 {
                return Err(CoordinatorError::Conflict("name already in use".into()));
            }
            Ok(opts.name.clone())
        }
    }

    fn info() -> SessionAgentInfo {
        let now = Utc::now();
        SessionAgentInfo {
            agent_name: "crewmux_main".into(),
            project_key: "/home/dev/proj".into(),
            registered_at: now,
            last_active_at: now,
        }
    }

    #[test]
    fn round_trip() {
        let dir = TempDir::new().expect("tempdir");
        let original = info();
        save_session_agent_in(dir.path(), "main", &original).expect("save");

        let loaded = load_session_agent_from(dir.path(), "main")
            .expect("load")
            .expect("present");
        assert_eq!(loaded, original);
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().expect("tempdir");
        let loaded = load_session_agent_from(dir.path(), "nope").expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn save_is_atomic_no_temp_left_behind() {
        let dir = TempDir::new().expect("tempdir");
        save_session_agent_in(dir.path(), "main", &info()).expect("save");

        let session_dir = dir.path().join("crewmux").join("sessions").join("main");
        let entries: Vec<String> = fs::read_dir(&session_dir)
            .expect("read dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["agent.json"]);
    }

    #[test]
    fn overwrite_replaces_content() {
        let dir = TempDir::new().expect("tempdir");
        let mut first = info();
        save_session_agent_in(dir.path(), "main", &first).expect("save");

        first.agent_name = "crewmux_main_0042".into();
        save_session_agent_in(dir.path(), "main", &first).expect("save again");

        let loaded = load_session_agent_from(dir.path(), "main")
            .expect("load")
            .expect("present");
        assert_eq!(loaded.agent_name, "crewmux_main_0042");
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        save_session_agent_in(dir.path(), "main", &info()).expect("save");
        delete_session_agent_in(dir.path(), "main").expect("delete");
        delete_session_agent_in(dir.path(), "main").expect("second delete is fine");
        assert!(load_session_agent_from(dir.path(), "main")
            .expect("load")
            .is_none());
    }

    #[cfg(unix)]
    #[test]
    fn file_mode_is_0644() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().expect("tempdir");
        save_session_agent_in(dir.path(), "main", &info()).expect("save");
        let path = session_agent_path_in(dir.path(), "main");
        let mode = fs::metadata(path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn register_creates_and_persists_identity() {
        let dir = TempDir::new().expect("tempdir");
        let mail = RecordingMail::new(false);
        let now = Utc::now();

        let info = register_session_agent_in(Some(&mail), dir.path(), "My Session", "/proj", now)
            .expect("register");
        assert_eq!(info.agent_name, "crewmux_my_session");
        assert_eq!(mail.attempts(), vec!["crewmux_my_session"]);

        let loaded = load_session_agent_from(dir.path(), "My Session")
            .expect("load")
            .expect("persisted");
        assert_eq!(loaded, info);
    }

    #[test]
    fn register_reuses_identity_across_restarts() {
        let dir = TempDir::new().expect("tempdir");
        let mail = RecordingMail::new(false);
        let t0 = Utc::now();

        let first =
            register_session_agent_in(Some(&mail), dir.path(), "main", "/proj", t0).expect("first");

        let t1 = t0 + chrono::Duration::seconds(60);
        let second = register_session_agent_in(Some(&mail), dir.path(), "main", "/proj", t1)
            .expect("second");

        assert_eq!(second.agent_name, first.agent_name, "no new name on restart");
        assert_eq!(second.registered_at, first.registered_at);
        assert_eq!(second.last_active_at, t1, "activity refreshed");
        assert_eq!(
            mail.attempts(),
            vec![first.agent_name.clone(), first.agent_name.clone()],
            "restart re-registers under the same name"
        );
    }

    #[test]
    fn register_name_conflict_persists_suffixed_name() {
        let dir = TempDir::new().expect("tempdir");
        let mail = RecordingMail::new(true);
        let now = Utc::now();

        let info = register_session_agent_in(Some(&mail), dir.path(), "main", "/proj", now)
            .expect("register");
        assert!(info.agent_name.starts_with("crewmux_main_"));
        assert_eq!(mail.attempts().len(), 2);

        let loaded = load_session_agent_from(dir.path(), "main")
            .expect("load")
            .expect("persisted");
        assert_eq!(loaded.agent_name, info.agent_name, "suffixed name survives restart");
    }

    #[test]
    fn register_without_mail_is_local_only() {
        let dir = TempDir::new().expect("tempdir");
        let now = Utc::now();

        let info =
            register_session_agent_in(None, dir.path(), "main", "/proj", now).expect("register");
        assert_eq!(info.agent_name, "crewmux_main");

        let again = register_session_agent_in(None, dir.path(), "main", "/proj", now)
            .expect("reuse");
        assert_eq!(again.agent_name, info.agent_name);
    }

    #[test]
    fn register_new_project_replaces_identity() {
        let dir = TempDir::new().expect("tempdir");
        let mail = RecordingMail::new(false);
        let now = Utc::now();

        register_session_agent_in(Some(&mail), dir.path(), "main", "/proj-a", now)
            .expect("register a");
        let replaced = register_session_agent_in(Some(&mail), dir.path(), "main", "/proj-b", now)
            .expect("register b");
        assert_eq!(replaced.project_key, "/proj-b");

        let loaded = load_session_agent_from(dir.path(), "main")
            .expect("load")
            .expect("persisted");
        assert_eq!(loaded.project_key, "/proj-b");
    }

    #[test]
    fn update_activity_bumps_timestamp() {
        let dir = TempDir::new().expect("tempdir");
        let t0 = Utc::now();
        let first =
            register_session_agent_in(None, dir.path(), "main", "/proj", t0).expect("register");

        let t1 = t0 + chrono::Duration::seconds(120);
        update_session_activity_in(dir.path(), "main", t1).expect("update");

        let loaded = load_session_agent_from(dir.path(), "main")
            .expect("load")
            .expect("persisted");
        assert_eq!(loaded.last_active_at, t1);
        assert_eq!(loaded.registered_at, first.registered_at);
    }

    #[test]
    fn update_activity_without_identity_is_noop() {
        let dir = TempDir::new().expect("tempdir");
        update_session_activity_in(dir.path(), "ghost", Utc::now()).expect("no-op");
        assert!(load_session_agent_from(dir.path(), "ghost")
            .expect("load")
            .is_none());
    }

    #[test]
    fn sanitize_collapses_and_lowercases() {
        assert_eq!(sanitize_session_name("My Session!"), "my_session");
        assert_eq!(sanitize_session_name("a--b__c"), "a_b_c");
        assert_eq!(sanitize_session_name("___x___"), "x");
        assert_eq!(sanitize_session_name("plain"), "plain");
    }
}
