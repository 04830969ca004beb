use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::media::{EMBED_API_SCRIPT_URL, embed_url};
use crate::media::sim::{PlayPolicy, SimCall, SimulatedPage};

struct Fixture {
    page: SimulatedPage,
    facade: MediaFacade,
}

impl Fixture {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let page = SimulatedPage::new();
        let facade = MediaFacade::new(
            Arc::new(page.clone()),
            Arc::new(page.clone()),
            EmbedApiLoader::new(),
        );
        Self { page, facade }
    }

    fn loader(&self) -> &EmbedApiLoader {
        self.facade.loader()
    }

    /// Deliver everything the page has to say to `session`.
    fn pump(&self, session: &Session) {
        for event in self.page.settle() {
            session.handle_event(event);
        }
    }

    fn embedded_ready(&self, video_id: &str) -> Session {
        let session = self.facade.initialize(MediaKind::Embedded, video_id).unwrap();
        self.loader().notify_ready();
        self.pump(&session);
        session
    }
}

fn drain(rx: &mut UnboundedReceiver<FacadeEvent>) -> Vec<FacadeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn is_embed_volume(call: &SimCall) -> bool {
    matches!(call, SimCall::EmbedVolume(_))
}

#[test]
fn test_blank_source_creates_no_session() {
    let fx = Fixture::new();
    assert!(fx.facade.initialize(MediaKind::Audio, "").is_none());
    assert!(fx.facade.initialize(MediaKind::Embedded, "   ").is_none());
    assert!(fx.page.calls().is_empty());
}

#[test]
fn test_native_session_is_ready_immediately() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.facade.initialize(MediaKind::Audio, "song.mp3").unwrap();

    assert_eq!(session.state(), PlaybackState::Ready);
    assert_eq!(*session.readiness().borrow(), Readiness::Ready);
    assert_eq!(
        drain(&mut rx),
        vec![FacadeEvent::StateChanged(PlaybackState::Ready), FacadeEvent::Ready]
    );
    assert_eq!(
        fx.page.calls(),
        vec![SimCall::Load("song.mp3".to_string()), SimCall::SetVolume(0.7)]
    );

    // Ready becomes Paused once the duration is known.
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Paused);
    assert_eq!(session.duration(), Some(180.0));
    assert_eq!(
        drain(&mut rx),
        vec![
            FacadeEvent::StateChanged(PlaybackState::Paused),
            FacadeEvent::ProgressChanged {
                position: 0.0,
                duration: 180.0
            },
        ]
    );
}

#[test]
fn test_video_toggle_play_resolves_then_pauses() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Video, "clip.mp4").unwrap();
    fx.pump(&session);

    session.toggle_playback().unwrap();
    // No optimistic update: the platform has not answered yet.
    assert_eq!(session.state(), PlaybackState::Paused);
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);

    session.toggle_playback().unwrap();
    assert_eq!(session.state(), PlaybackState::Paused);
    assert_eq!(fx.page.calls().last(), Some(&SimCall::Pause));
}

#[test]
fn test_play_rejection_reverts_to_paused() {
    let fx = Fixture::new();
    fx.page
        .set_play_policy(PlayPolicy::Reject("NotAllowedError".to_string()));
    let mut rx = fx.facade.subscribe();
    let session = fx.facade.initialize(MediaKind::Audio, "song.mp3").unwrap();
    fx.pump(&session);
    drain(&mut rx);

    assert_eq!(session.toggle_playback(), Ok(()));
    fx.pump(&session);

    assert_eq!(session.state(), PlaybackState::Paused);
    assert_eq!(
        drain(&mut rx),
        vec![FacadeEvent::PlaybackFailed("NotAllowedError".to_string())]
    );
    // The session still accepts commands after a rejection.
    fx.page.set_play_policy(PlayPolicy::Allow);
    session.toggle_playback().unwrap();
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);
}

#[test]
fn test_stale_play_resolution_is_ignored() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Video, "clip.mp4").unwrap();
    fx.pump(&session);

    session.play().unwrap();
    session.pause().unwrap();
    session.handle_event(BackendEvent::PlayResolved);
    assert_eq!(session.state(), PlaybackState::Paused);
}

#[test]
fn test_native_autoplay_rejected() {
    let fx = Fixture::new();
    fx.page
        .set_play_policy(PlayPolicy::Reject("autoplay blocked".to_string()));
    let options = SessionOptions {
        autoplay: true,
        ..SessionOptions::default()
    };
    let mut rx = fx.facade.subscribe();
    let session = fx
        .facade
        .initialize_with_options(MediaKind::Audio, "song.mp3", options)
        .unwrap();
    assert_eq!(fx.page.count_calls(|call| *call == SimCall::Play), 1);

    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Paused);
    assert!(drain(&mut rx).contains(&FacadeEvent::PlaybackFailed("autoplay blocked".to_string())));
}

#[test]
fn test_native_playback_ends() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.facade.initialize(MediaKind::Video, "clip.mp4").unwrap();
    fx.pump(&session);
    session.toggle_playback().unwrap();
    fx.pump(&session);
    drain(&mut rx);

    for event in fx.page.advance(200.0) {
        session.handle_event(event);
    }
    assert_eq!(session.state(), PlaybackState::Ended);
    assert_eq!(session.progress().label(), "3:00 / 3:00");
    assert_eq!(drain(&mut rx).last(), Some(&FacadeEvent::PlaybackEnded));
}

#[test]
fn test_load_failure_fails_the_session() {
    let fx = Fixture::new();
    fx.page.fail_loads("404");
    let session = fx.facade.initialize(MediaKind::Audio, "missing.mp3").unwrap();
    fx.pump(&session);

    assert_eq!(session.state(), PlaybackState::Failed);
    assert_eq!(
        *session.readiness().borrow(),
        Readiness::Failed("missing.mp3: 404".to_string())
    );
    assert_eq!(
        session.toggle_playback(),
        Err(MediaError::InvalidCommand("toggle_playback"))
    );
}

#[test]
fn test_seek_with_unknown_duration_is_a_no_op() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Video, "clip.mp4").unwrap();
    let before = session.snapshot();
    let calls = fx.page.calls();

    assert_eq!(session.seek(0.5), Ok(()));
    assert_eq!(session.snapshot(), before);
    assert_eq!(fx.page.calls(), calls);
}

#[test]
fn test_seek_then_progress_lands_on_target() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Video, "clip.mp4").unwrap();
    fx.pump(&session);

    for fraction in [0.0, 0.25, 0.5, 1.0] {
        session.seek(fraction).unwrap();
        let progress = session.progress();
        assert!((progress.position - fraction * 180.0).abs() < 1.0);
    }

    let embedded = fx.embedded_ready("abc123");
    embedded.seek(0.5).unwrap();
    assert_eq!(fx.page.calls().last(), Some(&SimCall::SeekTo(90.0)));
    assert!((embedded.progress().position - 90.0).abs() < 1.0);
}

#[test]
fn test_seek_fraction_is_sanitized() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Video, "clip.mp4").unwrap();
    fx.pump(&session);
    fx.page.clear_calls();

    session.seek(f64::NAN).unwrap();
    session.seek(f64::INFINITY).unwrap();
    assert!(fx.page.calls().is_empty());

    session.seek(1.5).unwrap();
    session.seek(-0.5).unwrap();
    assert_eq!(
        fx.page.calls(),
        vec![SimCall::SetCurrentTime(180.0), SimCall::SetCurrentTime(0.0)]
    );
}

#[test]
fn test_volume_is_clamped() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.facade.initialize(MediaKind::Audio, "song.mp3").unwrap();
    drain(&mut rx);

    session.set_volume(150).unwrap();
    assert_eq!(session.volume(), 100);
    assert_eq!(fx.page.element_volume(), Some(1.0));
    session.set_volume(-5).unwrap();
    assert_eq!(session.volume(), 0);
    assert_eq!(
        drain(&mut rx),
        vec![FacadeEvent::VolumeChanged(100), FacadeEvent::VolumeChanged(0)]
    );
}

#[test]
fn test_embedded_waits_for_the_api() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();

    assert_eq!(session.state(), PlaybackState::Uninitialized);
    assert_eq!(*session.readiness().borrow(), Readiness::Pending);
    assert_eq!(
        fx.page.calls(),
        vec![SimCall::InjectScript(EMBED_API_SCRIPT_URL.to_string())]
    );
    assert_eq!(session.progress(), Progress::default());
}

#[test]
fn test_embedded_commands_before_ready_flush_in_order() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    session.set_volume(40).unwrap();
    session.toggle_playback().unwrap();
    assert_eq!(session.snapshot().deferred, 2);
    fx.page.clear_calls();

    fx.loader().notify_ready();
    // Constructed, but not commanded before its own ready event.
    assert_eq!(fx.page.calls(), vec![SimCall::CreateEmbed(embed_url("abc123"))]);

    fx.pump(&session);
    assert_eq!(
        fx.page.calls(),
        vec![
            SimCall::CreateEmbed(embed_url("abc123")),
            SimCall::EmbedVolume(40),
            SimCall::PlayVideo,
        ]
    );
    assert_eq!(fx.page.embed_volume(), Some(40));
    assert_eq!(session.snapshot().deferred, 0);

    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);
}

#[test]
fn test_embedded_pre_ready_volume_is_applied_once() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    session.set_volume(70).unwrap();
    fx.loader().notify_ready();
    fx.pump(&session);

    assert_eq!(fx.page.count_calls(is_embed_volume), 1);
    assert_eq!(fx.page.count_calls(|call| *call == SimCall::EmbedVolume(70)), 1);
}

#[test]
fn test_embedded_initial_volume_applied_on_ready() {
    let fx = Fixture::new();
    let options = SessionOptions {
        volume: 55,
        ..SessionOptions::default()
    };
    let session = fx
        .facade
        .initialize_with_options(MediaKind::Embedded, "abc123", options)
        .unwrap();
    fx.loader().notify_ready();
    fx.pump(&session);

    assert_eq!(fx.page.count_calls(is_embed_volume), 1);
    assert_eq!(fx.page.embed_volume(), Some(55));
    assert_eq!(session.state(), PlaybackState::Paused);
}

#[test]
fn test_deferred_seek_uses_duration_after_ready() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    session.seek(0.5).unwrap();
    fx.loader().notify_ready();
    fx.pump(&session);
    assert_eq!(fx.page.calls().last(), Some(&SimCall::SeekTo(90.0)));
}

#[test]
fn test_deferred_seek_waits_for_late_duration() {
    let fx = Fixture::new();
    fx.page.delay_embed_metadata();
    fx.page.set_media_duration(200.0);
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    session.seek(0.5).unwrap();
    session.toggle_playback().unwrap();
    fx.loader().notify_ready();

    // Ready, but the player still reports no duration.
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Ready);
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::SeekTo(_))), 0);

    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);
    assert_eq!(fx.page.calls().last(), Some(&SimCall::SeekTo(100.0)));
    assert_eq!(session.progress().position, 100.0);

    session.poll_progress();
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::SeekTo(_))), 1);
}

#[test]
fn test_embedded_autoplay_after_ready() {
    let fx = Fixture::new();
    let options = SessionOptions {
        autoplay: true,
        ..SessionOptions::default()
    };
    let session = fx
        .facade
        .initialize_with_options(MediaKind::Embedded, "abc123", options)
        .unwrap();
    fx.loader().notify_ready();
    fx.pump(&session);
    assert_eq!(fx.page.count_calls(|call| *call == SimCall::PlayVideo), 1);

    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);
}

#[test]
fn test_deferred_pause_overrides_autoplay() {
    let fx = Fixture::new();
    let options = SessionOptions {
        autoplay: true,
        ..SessionOptions::default()
    };
    let session = fx
        .facade
        .initialize_with_options(MediaKind::Embedded, "abc123", options)
        .unwrap();
    session.pause().unwrap();
    fx.loader().notify_ready();
    fx.pump(&session);
    assert_eq!(fx.page.count_calls(|call| *call == SimCall::PlayVideo), 0);
}

#[test]
fn test_embedded_playback_ends() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.embedded_ready("abc123");
    session.toggle_playback().unwrap();
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);

    for event in fx.page.advance(500.0) {
        session.handle_event(event);
    }
    assert_eq!(session.state(), PlaybackState::Ended);
    assert_eq!(drain(&mut rx).last(), Some(&FacadeEvent::PlaybackEnded));
}

#[test]
fn test_player_error_fails_the_session() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.embedded_ready("abc123");
    drain(&mut rx);

    session.handle_event(BackendEvent::PlayerError(150));
    assert_eq!(session.state(), PlaybackState::Failed);
    assert_eq!(
        drain(&mut rx),
        vec![
            FacadeEvent::StateChanged(PlaybackState::Failed),
            FacadeEvent::PlaybackFailed("video owner does not allow embedding".to_string()),
        ]
    );
    assert_eq!(session.seek(0.5), Err(MediaError::InvalidCommand("seek")));
}

#[test]
fn test_api_failure_leaves_the_session_failed() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    fx.loader().notify_failed("script blocked");

    assert_eq!(session.state(), PlaybackState::Failed);
    assert_eq!(
        *session.readiness().borrow(),
        Readiness::Failed("backend unavailable: script blocked".to_string())
    );
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::CreateEmbed(_))), 0);
}

#[test]
fn test_sessions_sharing_a_loader_are_notified_in_order() {
    let fx = Fixture::new();
    let first = fx.facade.initialize(MediaKind::Embedded, "one").unwrap();
    let second = fx.facade.initialize(MediaKind::Embedded, "two").unwrap();
    assert_eq!(
        fx.page.count_calls(|call| matches!(call, SimCall::InjectScript(_))),
        1
    );
    assert_eq!(fx.loader().pending(), 2);

    assert_eq!(fx.loader().notify_ready(), 2);
    assert_eq!(
        fx.page.calls()[1..],
        [
            SimCall::CreateEmbed(embed_url("one")),
            SimCall::CreateEmbed(embed_url("two")),
        ]
    );

    // A session created after the API loaded is constructed at once.
    let third = fx.facade.initialize(MediaKind::Embedded, "three").unwrap();
    assert_eq!(
        fx.page.calls().last(),
        Some(&SimCall::CreateEmbed(embed_url("three")))
    );
    assert_eq!(fx.loader().pending(), 0);
    for session in [&first, &second, &third] {
        assert_eq!(session.state(), PlaybackState::Uninitialized);
    }
}

#[test]
fn test_commands_after_dispose_are_rejected() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Audio, "song.mp3").unwrap();
    session.dispose();
    session.dispose();

    assert_eq!(session.state(), PlaybackState::Disposed);
    assert_eq!(fx.page.count_calls(|call| *call == SimCall::Release), 1);
    assert_eq!(
        session.toggle_playback(),
        Err(MediaError::InvalidCommand("toggle_playback"))
    );
    assert_eq!(session.set_volume(10), Err(MediaError::InvalidCommand("set_volume")));
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::AfterTeardown(_))), 0);
}

#[test]
fn test_dispose_before_api_ready_constructs_nothing() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    session.set_volume(30).unwrap();
    session.dispose();
    assert_eq!(fx.loader().pending(), 0);

    assert_eq!(fx.loader().notify_ready(), 0);
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::CreateEmbed(_))), 0);
    assert_eq!(session.state(), PlaybackState::Disposed);
}

#[test]
fn test_dispose_destroys_a_constructed_player() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();
    fx.loader().notify_ready();
    session.dispose();
    assert_eq!(fx.page.count_calls(|call| *call == SimCall::Destroy), 1);

    // The destroyed player's ready event never reaches it.
    fx.pump(&session);
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::AfterTeardown(_))), 0);
}

#[test]
fn test_weak_poll_after_dispose_is_a_no_op() {
    let fx = Fixture::new();
    let session = fx.embedded_ready("abc123");
    let weak = session.downgrade();
    assert!(weak.poll_progress());

    session.dispose();
    let before = session.snapshot();
    assert!(!weak.poll_progress());
    assert_eq!(session.snapshot(), before);

    drop(session);
    assert!(weak.upgrade().is_none());
    assert!(!weak.poll_progress());
}

#[tokio::test(start_paused = true)]
async fn test_polling_reports_progress_until_dispose() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.embedded_ready("abc123");
    session.toggle_playback().unwrap();
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Playing);
    drain(&mut rx);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let ticks = drain(&mut rx);
    assert!(
        ticks
            .iter()
            .any(|event| matches!(event, FacadeEvent::ProgressChanged { .. }))
    );

    session.dispose();
    drain(&mut rx);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pause_stops_polling() {
    let fx = Fixture::new();
    let mut rx = fx.facade.subscribe();
    let session = fx.embedded_ready("abc123");
    session.toggle_playback().unwrap();
    fx.pump(&session);
    session.toggle_playback().unwrap();
    fx.pump(&session);
    assert_eq!(session.state(), PlaybackState::Paused);
    drain(&mut rx);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_ready_times_out_into_failed() {
    let fx = Fixture::new();
    let session = fx.facade.initialize(MediaKind::Embedded, "abc123").unwrap();

    let outcome = session.wait_ready(Duration::from_secs(5)).await;
    assert!(matches!(outcome, Err(MediaError::BackendUnavailable(_))));
    assert_eq!(session.state(), PlaybackState::Failed);

    // The API arriving late does not revive it.
    fx.loader().notify_ready();
    assert_eq!(fx.page.count_calls(|call| matches!(call, SimCall::CreateEmbed(_))), 0);
}

#[tokio::test]
async fn test_wait_ready_resolves() {
    let fx = Fixture::new();
    let native = fx.facade.initialize(MediaKind::Audio, "song.mp3").unwrap();
    assert_eq!(native.wait_ready(Duration::from_secs(1)).await, Ok(()));

    let embedded = fx.embedded_ready("abc123");
    assert_eq!(embedded.wait_ready(Duration::from_secs(1)).await, Ok(()));

    embedded.dispose();
    assert_eq!(
        embedded.wait_ready(Duration::from_secs(1)).await,
        Err(MediaError::InvalidCommand("wait_ready"))
    );
}
