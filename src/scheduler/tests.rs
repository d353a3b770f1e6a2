use std::fs;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use super::*;
use crate::compiler::{self, CompilerMsg, ErrorKind};

const MAX_AGE: Duration = Duration::from_secs(60);

struct Fixture {
    _dir: TempDir,
    pages: PathBuf,
    scheduler: Scheduler,
    rx: UnboundedReceiver<CompilerMsg>,
}

fn fixture(files: &[&str]) -> Fixture {
    let dir = TempDir::new().unwrap();
    let pages = dir.path().join("pages");
    for file in files {
        let path = pages.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, *file).unwrap();
    }

    let options = SchedulerOptions {
        pages_dir: pages.clone(),
        extensions: vec!["html".into(), "md".into()],
        output_dir: dir.path().join("out"),
        output_extension: "html".into(),
        max_inactive_age: MAX_AGE,
        pages_buffer_length: NonZeroUsize::new(2).unwrap(),
        dispose_interval: Duration::from_secs(5),
    };
    let (driver, rx) = compiler::channel();

    Fixture {
        _dir: dir,
        pages,
        scheduler: Scheduler::new(options, driver),
        rx,
    }
}

/// Let spawned tasks run up to their next await point.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

fn spawn_ensure(scheduler: &Scheduler, page: &'static str) -> JoinHandle<Result<PagePath, PageError>> {
    let scheduler = scheduler.clone();
    tokio::spawn(async move { scheduler.ensure_page(page).await })
}

/// Run a pass in which every entry point is produced without errors.
fn complete_pass(scheduler: &Scheduler) -> Vec<PagePath> {
    let entries = scheduler.begin_pass().unwrap();
    let produced: Vec<PagePath> = entries.into_iter().map(|e| e.page).collect();
    scheduler.finish_pass(PassReport {
        produced: produced.clone(),
        errors: vec![],
    });
    produced
}

fn assert_invalidate(rx: &mut UnboundedReceiver<CompilerMsg>) {
    match rx.try_recv() {
        Ok(CompilerMsg::Invalidate) => {}
        other => panic!("expected Invalidate, got {other:?}"),
    }
}

fn assert_quiet(rx: &mut UnboundedReceiver<CompilerMsg>) {
    match rx.try_recv() {
        Err(TryRecvError::Empty) => {}
        other => panic!("expected no message, got {other:?}"),
    }
}

async fn build(fx: &mut Fixture, page: &'static str) -> PagePath {
    let handle = spawn_ensure(&fx.scheduler, page);
    settle().await;
    assert_invalidate(&mut fx.rx);
    complete_pass(&fx.scheduler);
    let page = handle.await.unwrap().unwrap();
    assert_quiet(&mut fx.rx);
    page
}

// =============================================================================
// ensure_page
// =============================================================================

#[tokio::test]
async fn test_ensure_page_builds_new_entry() {
    let mut fx = fixture(&["about.html"]);

    let handle = spawn_ensure(&fx.scheduler, "/about");
    settle().await;

    let about = PagePath::new("/about");
    assert_eq!(fx.scheduler.status(&about), Some(EntryStatus::Added));
    assert_invalidate(&mut fx.rx);
    assert!(!handle.is_finished());

    let entries = fx.scheduler.begin_pass().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "pages/about.html");
    assert_eq!(entries[0].source, fx.pages.join("about.html"));

    fx.scheduler.finish_pass(PassReport {
        produced: vec![about.clone()],
        errors: vec![],
    });

    assert_eq!(handle.await.unwrap(), Ok(about.clone()));
    assert_eq!(fx.scheduler.status(&about), Some(EntryStatus::Built));
}

#[tokio::test]
async fn test_ensure_page_built_returns_immediately() {
    let mut fx = fixture(&["index.html"]);
    let root = build(&mut fx, "/").await;
    assert!(root.is_root());

    assert_eq!(fx.scheduler.ensure_page("/index").await, Ok(root.clone()));
    assert_eq!(fx.scheduler.ensure_page("/").await, Ok(root));
    assert_quiet(&mut fx.rx);
}

#[tokio::test]
async fn test_ensure_page_directory_index() {
    let mut fx = fixture(&["docs/index.md"]);
    let docs = build(&mut fx, "/docs/").await;
    assert_eq!(docs, "/docs");
    assert_eq!(
        fx.scheduler.artifact(&docs),
        Some(fx.scheduler.options().output_dir.join("pages/docs.html"))
    );
}

#[tokio::test]
async fn test_ensure_page_not_found() {
    let fx = fixture(&["about.html"]);

    let missing = fx.scheduler.ensure_page("/missing").await;
    assert_eq!(missing, Err(PageError::NotFound("/missing".into())));

    let escaped = fx.scheduler.ensure_page("/../about").await;
    assert!(matches!(escaped, Err(PageError::NotFound(_))));

    assert_eq!(fx.scheduler.entry_count(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_released_together() {
    let mut fx = fixture(&["x.html"]);

    let handles: Vec<_> = (0..5).map(|_| spawn_ensure(&fx.scheduler, "/x")).collect();
    settle().await;
    assert_eq!(fx.scheduler.waiter_count("/x"), 5);
    assert_eq!(fx.scheduler.entry_count(), 1);

    // One pass request for the whole batch.
    assert_invalidate(&mut fx.rx);
    assert_quiet(&mut fx.rx);

    let entries = fx.scheduler.begin_pass().unwrap();
    settle().await;
    assert!(handles.iter().all(|h| !h.is_finished()));

    fx.scheduler.finish_pass(PassReport {
        produced: entries.into_iter().map(|e| e.page).collect(),
        errors: vec![],
    });

    for handle in handles {
        assert_eq!(handle.await.unwrap(), Ok(PagePath::new("/x")));
    }
    assert_eq!(fx.scheduler.waiter_count("/x"), 0);
}

#[tokio::test]
async fn test_vanished_source_releases_not_found() {
    let mut fx = fixture(&["gone.html"]);

    let handle = spawn_ensure(&fx.scheduler, "/gone");
    settle().await;
    assert_invalidate(&mut fx.rx);

    fs::remove_file(fx.pages.join("gone.html")).unwrap();
    let entries = fx.scheduler.begin_pass().unwrap();
    assert!(entries.is_empty());

    assert_eq!(handle.await.unwrap(), Err(PageError::NotFound("/gone".into())));
    assert_eq!(fx.scheduler.entry_count(), 0);
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_invalidations_during_pass_coalesce() {
    let mut fx = fixture(&["a.html"]);
    build(&mut fx, "/a").await;

    fx.scheduler.invalidate();
    assert_invalidate(&mut fx.rx);

    fx.scheduler.begin_pass().unwrap();
    fx.scheduler.invalidate();
    fx.scheduler.invalidate();
    assert_quiet(&mut fx.rx);

    fx.scheduler.finish_pass(PassReport {
        produced: vec![PagePath::new("/a")],
        errors: vec![],
    });

    // Exactly one follow-up pass.
    assert_invalidate(&mut fx.rx);
    assert_quiet(&mut fx.rx);

    complete_pass(&fx.scheduler);
    assert_quiet(&mut fx.rx);
}

#[tokio::test]
async fn test_unproduced_entry_stays_building() {
    let mut fx = fixture(&["a.html", "b.html"]);

    let a = spawn_ensure(&fx.scheduler, "/a");
    let b = spawn_ensure(&fx.scheduler, "/b");
    settle().await;
    assert_invalidate(&mut fx.rx);

    fx.scheduler.begin_pass().unwrap();
    fx.scheduler.finish_pass(PassReport {
        produced: vec![PagePath::new("/a")],
        errors: vec![],
    });

    assert_eq!(a.await.unwrap(), Ok(PagePath::new("/a")));
    settle().await;
    assert!(!b.is_finished());
    assert_eq!(fx.scheduler.status(&PagePath::new("/b")), Some(EntryStatus::Building));

    fx.scheduler.invalidate();
    assert_invalidate(&mut fx.rx);
    complete_pass(&fx.scheduler);
    assert_eq!(b.await.unwrap(), Ok(PagePath::new("/b")));
}

// =============================================================================
// Errors and reload
// =============================================================================

#[tokio::test]
async fn test_soft_errors_are_retained_per_page() {
    let mut fx = fixture(&["a.html"]);
    let a = PagePath::new("/a");

    let handle = spawn_ensure(&fx.scheduler, "/a");
    settle().await;
    assert_invalidate(&mut fx.rx);

    fx.scheduler.begin_pass().unwrap();
    fx.scheduler.finish_pass(PassReport {
        produced: vec![a.clone()],
        errors: vec![
            CompileError::new(ErrorKind::Build, "a.html", "syntax error").in_entry(a.clone()),
            CompileError::new(ErrorKind::Build, "partial.html", "bad include")
                .in_dependency_of(a.clone(), 1),
        ],
    });

    assert_eq!(handle.await.unwrap(), Ok(a.clone()));
    let errors = fx.scheduler.compilation_errors(&a);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "syntax error");

    fx.scheduler.invalidate();
    assert_invalidate(&mut fx.rx);
    complete_pass(&fx.scheduler);
    assert!(fx.scheduler.compilation_errors(&a).is_empty());
}

#[tokio::test]
async fn test_hard_failure_triggers_reload() {
    let mut fx = fixture(&["a.html", "b.html"]);
    let a = build(&mut fx, "/a").await;
    let b = PagePath::new("/b");

    let waiting_b = spawn_ensure(&fx.scheduler, "/b");
    settle().await;
    assert_invalidate(&mut fx.rx);

    fx.scheduler.begin_pass().unwrap();
    fx.scheduler.finish_pass(PassReport {
        produced: vec![a.clone()],
        errors: vec![
            CompileError::new(ErrorKind::ModuleNotFound, "b.html", "module not found")
                .in_entry(b.clone()),
        ],
    });
    assert!(fx.scheduler.is_reloading());
    assert_eq!(fx.scheduler.status(&a), Some(EntryStatus::Added));

    settle().await;
    let reply = match fx.rx.try_recv() {
        Ok(CompilerMsg::Rebuild(reply)) => reply,
        other => panic!("expected Rebuild, got {other:?}"),
    };

    // Requests and invalidations wait out the reload.
    let waiting_a = spawn_ensure(&fx.scheduler, "/a");
    fx.scheduler.invalidate();
    assert!(fx.scheduler.begin_pass().is_none());
    settle().await;
    assert!(!waiting_a.is_finished());
    assert!(!waiting_b.is_finished());
    assert_quiet(&mut fx.rx);

    reply.send(Ok(())).unwrap();
    settle().await;
    assert!(!fx.scheduler.is_reloading());
    assert_invalidate(&mut fx.rx);

    let produced = complete_pass(&fx.scheduler);
    assert_eq!(produced, vec![a.clone(), b.clone()]);
    assert_eq!(waiting_a.await.unwrap(), Ok(a));
    assert_eq!(waiting_b.await.unwrap(), Ok(b));
}

#[tokio::test]
async fn test_shutdown_during_reload_is_not_fatal() {
    let mut fx = fixture(&["a.html"]);
    let a = build(&mut fx, "/a").await;

    fx.scheduler.invalidate();
    assert_invalidate(&mut fx.rx);
    fx.scheduler.begin_pass().unwrap();
    fx.scheduler.finish_pass(PassReport {
        produced: vec![],
        errors: vec![
            CompileError::new(ErrorKind::ModuleNotFound, "a.html", "module not found")
                .in_entry(a.clone()),
        ],
    });
    settle().await;
    let reply = match fx.rx.try_recv() {
        Ok(CompilerMsg::Rebuild(reply)) => reply,
        other => panic!("expected Rebuild, got {other:?}"),
    };

    // The actor exits on shutdown without answering the rebuild.
    fx.scheduler.stop();
    drop(reply);
    settle().await;

    assert!(fx.scheduler.is_reloading());
    assert_eq!(fx.scheduler.ensure_page("/a").await, Err(PageError::Stopped(a)));
}

#[tokio::test]
async fn test_missing_dependency_with_dependents_is_soft() {
    let mut fx = fixture(&["a.html"]);
    let a = PagePath::new("/a");

    let handle = spawn_ensure(&fx.scheduler, "/a");
    settle().await;
    assert_invalidate(&mut fx.rx);

    fx.scheduler.begin_pass().unwrap();
    fx.scheduler.finish_pass(PassReport {
        produced: vec![a.clone()],
        errors: vec![
            CompileError::new(ErrorKind::ModuleNotFound, "lib.html", "module not found")
                .in_dependency_of(a.clone(), 2),
        ],
    });

    assert!(!fx.scheduler.is_reloading());
    assert_eq!(handle.await.unwrap(), Ok(a.clone()));
    assert!(fx.scheduler.compilation_errors(&a).is_empty());
}

// =============================================================================
// Liveness and disposal
// =============================================================================

#[tokio::test]
async fn test_ping_responses() {
    let mut fx = fixture(&["a.html", "_error.html", "slow.html"]);
    build(&mut fx, "/a").await;
    build(&mut fx, "/_error").await;

    assert_eq!(fx.scheduler.handle_ping("/a"), Some(PingResponse::Success));
    assert_eq!(fx.scheduler.handle_ping("/_error"), Some(PingResponse::Invalid));
    assert_eq!(fx.scheduler.handle_ping("/nope"), Some(PingResponse::Invalid));

    let _slow = spawn_ensure(&fx.scheduler, "/slow");
    settle().await;
    assert_eq!(fx.scheduler.handle_ping("/slow"), None);

    assert_eq!(
        fx.scheduler.recent_pages(),
        vec![PagePath::new("/_error"), PagePath::new("/a")]
    );
}

#[tokio::test]
async fn test_dispose_inactive_spares_recent() {
    let mut fx = fixture(&["a.html", "b.html"]);
    let a = build(&mut fx, "/a").await;
    let b = build(&mut fx, "/b").await;
    fx.scheduler.handle_ping("/b");

    let later = Instant::now() + MAX_AGE * 2;
    assert_eq!(fx.scheduler.dispose_inactive(later), vec![a.clone()]);
    assert_eq!(fx.scheduler.status(&a), None);
    assert_eq!(fx.scheduler.status(&b), Some(EntryStatus::Built));

    match fx.rx.try_recv() {
        Ok(CompilerMsg::Dispose(entries)) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].page, a);
        }
        other => panic!("expected Dispose, got {other:?}"),
    }
    assert_invalidate(&mut fx.rx);

    // Pinged pages are kept however long they idle.
    complete_pass(&fx.scheduler);
    let much_later = Instant::now() + MAX_AGE * 100;
    assert!(fx.scheduler.dispose_inactive(much_later).is_empty());
    assert_eq!(fx.scheduler.status(&b), Some(EntryStatus::Built));
}

#[tokio::test]
async fn test_dispose_skips_building() {
    let mut fx = fixture(&["a.html"]);

    let _handle = spawn_ensure(&fx.scheduler, "/a");
    settle().await;
    assert_invalidate(&mut fx.rx);
    fx.scheduler.begin_pass().unwrap();

    let later = Instant::now() + MAX_AGE * 2;
    assert!(fx.scheduler.dispose_inactive(later).is_empty());
    assert_eq!(fx.scheduler.entry_count(), 1);
}

#[tokio::test]
async fn test_stop_releases_waiters() {
    let mut fx = fixture(&["a.html"]);

    let handle = spawn_ensure(&fx.scheduler, "/a");
    settle().await;
    assert_invalidate(&mut fx.rx);

    fx.scheduler.stop();
    assert!(fx.scheduler.cancel_token().is_cancelled());
    assert!(matches!(fx.rx.try_recv(), Ok(CompilerMsg::Shutdown)));
    assert_eq!(handle.await.unwrap(), Err(PageError::Stopped(PagePath::new("/a"))));

    let after = fx.scheduler.ensure_page("/a").await;
    assert_eq!(after, Err(PageError::Stopped(PagePath::new("/a"))));
}
