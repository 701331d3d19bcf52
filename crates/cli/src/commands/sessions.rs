//! `quill sessions`: list and delete stored sessions.

use quill_config::AppConfig;
use quill_session::SessionStore;

pub fn list() -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(AppConfig::sessions_dir());
    let sessions = store.list();
    if sessions.is_empty() {
        println!("No sessions in {}", store.root().display());
        return Ok(());
    }

    for session in sessions {
        println!(
            "{}  {}  {}",
            session.id,
            session.last_activity_at.format("%Y-%m-%d %H:%M"),
            session.work_dir.display()
        );
    }
    Ok(())
}

pub fn delete(id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::new(AppConfig::sessions_dir());
    store.delete(id)?;
    println!("Deleted session {id}");
    Ok(())
}
