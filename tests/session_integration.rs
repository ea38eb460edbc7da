use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use glc_viewer::config::{Configuration, InitialPose};
use glc_viewer::error::{SessionConflictError, StartError, SurfaceLostError};
use glc_viewer::events::SessionEvent;
use glc_viewer::pixels::PixelBuffer;
use glc_viewer::render::frame_loop::RunState;
use glc_viewer::render::surface::MemorySurface;
use glc_viewer::scene::ColorCubeSettings;
use glc_viewer::session::SessionRegistry;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio::runtime::Handle;

fn fast_config() -> Configuration {
    Configuration {
        refresh_rate_hz: 250.0,
        color_cube: ColorCubeSettings {
            resolution: 4,
            ..ColorCubeSettings::default()
        },
        ..Configuration::default()
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timeout waiting for {what}"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_bind_conflicts_and_first_session_is_unaffected() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let first_surface = MemorySurface::new(16, 16);
    let first = registry.bind("canvas", first_surface.clone()).unwrap();

    let err = registry
        .bind("canvas", MemorySurface::new(16, 16))
        .err()
        .expect("second bind must fail");
    assert_eq!(
        err,
        SessionConflictError {
            surface_id: "canvas".into()
        }
    );

    first.start().unwrap();
    wait_until("first frame", || first_surface.frames_presented() > 0).await;
    assert_eq!(first.run_state(), RunState::Running);

    // a different surface id is independent
    let other = registry.bind("other", MemorySurface::new(4, 4)).unwrap();
    assert_eq!(other.surface_id(), "other");
    first.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_frame_is_presented_after_stop_even_with_transform_in_flight() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let surface = MemorySurface::new(32, 32);
    let session = registry.bind("canvas", surface.clone()).unwrap();
    session.start().unwrap();
    wait_until("first frame", || surface.frames_presented() > 0).await;

    session.set_transform_angle(90.0).unwrap();
    session.set_input_image(PixelBuffer::filled(1024, 1024, [200, 40, 40, 255]).unwrap());
    session.stop();

    let presented = surface.frames_presented();
    let published = session.scene().image.is_some();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(surface.frames_presented(), presented);
    assert_eq!(session.scene().image.is_some(), published);
    assert_eq!(session.run_state(), RunState::Stopped);

    // restarting needs the surface back, then recomputes from the retained input
    session.rebind(surface.clone()).unwrap();
    session.start().unwrap();
    wait_until("transformed image", || session.scene().image.is_some()).await;
    wait_until("fresh frame", || surface.frames_presented() > presented).await;
    session.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_is_idempotent() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let session = registry.bind("canvas", MemorySurface::new(8, 8)).unwrap();
    session.stop();
    session.start().unwrap();
    session.stop();
    session.stop();
    assert_eq!(session.run_state(), RunState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroyed_surface_stops_the_session_until_rebound() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let surface = MemorySurface::new(8, 8);
    let session = registry.bind("canvas", surface.clone()).unwrap();
    session.start().unwrap();
    wait_until("first frame", || surface.frames_presented() > 0).await;

    surface.destroy();
    wait_until("stop after loss", || session.run_state() == RunState::Stopped).await;

    let events = session.take_events();
    assert!(
        events.iter().any(|e| matches!(
            e,
            SessionEvent::SurfaceLost(SurfaceLostError { surface_id }) if surface_id == "canvas"
        )),
        "expected a SurfaceLost event, got {events:?}"
    );
    assert_eq!(
        session.start(),
        Err(StartError::Lost(SurfaceLostError {
            surface_id: "canvas".into()
        }))
    );
    // explicit stop after loss is still fine
    session.stop();

    // the host recreates the surface and hands it back
    let recreated = MemorySurface::new(8, 8);
    session.rebind(recreated.clone()).unwrap();
    session.start().unwrap();
    wait_until("frame on recreated surface", || recreated.frames_presented() > 0).await;
    session.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_releases_the_surface_binding() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let surface = MemorySurface::new(8, 8);
    let first = registry.bind("canvas", surface.clone()).unwrap();
    first.set_transform_angle(30.0).unwrap();
    first.start().unwrap();
    wait_until("first frame", || surface.frames_presented() > 0).await;

    first.stop();
    assert!(!registry.is_bound("canvas"));

    // another session may now take the surface
    let second = registry.bind("canvas", surface.clone()).unwrap();
    assert_eq!(
        first.rebind(surface.clone()),
        Err(SessionConflictError {
            surface_id: "canvas".into()
        })
    );
    assert!(matches!(first.start(), Err(StartError::Released { .. })));

    // once it is given up, the stopped session resumes with its state intact
    drop(second);
    first.rebind(surface.clone()).unwrap();
    assert_eq!(first.transform().angle(), 30.0);
    let presented = surface.frames_presented();
    first.start().unwrap();
    wait_until("resumed frame", || surface.frames_presented() > presented).await;
    first.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unvalidated_refresh_rate_still_binds_and_ticks() {
    let config = Configuration::from_yaml_str("refresh-rate-hz: 0").unwrap();
    let registry = SessionRegistry::new(config, Handle::current());
    let surface = MemorySurface::new(8, 8);
    let session = registry.bind("canvas", surface.clone()).unwrap();
    session.start().unwrap();
    wait_until("first frame", || surface.frames_presented() > 0).await;
    session.stop();
}

fn large_png() -> Vec<u8> {
    let mut out = Vec::new();
    RgbaImage::from_fn(2048, 2048, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_frame_is_presented_after_stop_even_with_decode_in_flight() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let surface = MemorySurface::new(16, 16);
    let session = Arc::new(registry.bind("canvas", surface.clone()).unwrap());
    session.start().unwrap();
    wait_until("first frame", || surface.frames_presented() > 0).await;

    let bytes = large_png();
    let uploading = Arc::clone(&session);
    let upload = tokio::spawn(async move { uploading.upload("big.png", bytes).await });
    session.stop();
    let presented = surface.frames_presented();

    let info = upload.await.unwrap().unwrap();
    assert_eq!((info.width, info.height), (2048, 2048));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(surface.frames_presented(), presented);
    assert!(session.scene().image.is_none());
    assert_eq!(session.run_state(), RunState::Stopped);

    // the decoded image was kept as input and shows up after a restart
    session.rebind(surface.clone()).unwrap();
    session.start().unwrap();
    wait_until("uploaded image", || session.scene().image.is_some()).await;
    assert_eq!(session.scene().image.unwrap().dimensions(), (2048, 2048));
    session.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn drag_moves_the_session_camera() {
    let config = Configuration {
        initial_pose: InitialPose {
            yaw_degrees: 0.0,
            pitch_degrees: 0.0,
            dolly: 5.0,
        },
        ..fast_config()
    };
    let registry = SessionRegistry::new(config, Handle::current());
    let session = registry.bind("canvas", MemorySurface::new(8, 8)).unwrap();

    let pose = session.apply_delta(10.0, 0.0, false);
    assert!((pose.yaw - 0.1).abs() < 1e-6);
    assert_eq!(pose.pitch, 0.0);
    assert_eq!(pose.dolly, 5.0);

    let pose = session.apply_delta(100.0, 0.0, true);
    assert!((pose.dolly - 4.0).abs() < 1e-6);
    assert_eq!(session.pose(), pose);

    // dolly bottoms out at the configured floor
    let pose = session.apply_delta(10_000.0, 0.0, true);
    assert_eq!(pose.dolly, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_session_frees_the_surface_and_stops_rendering() {
    let registry = SessionRegistry::new(fast_config(), Handle::current());
    let surface = MemorySurface::new(8, 8);
    let session = registry.bind("canvas", surface.clone()).unwrap();
    session.start().unwrap();
    wait_until("first frame", || surface.frames_presented() > 0).await;

    drop(session);
    let presented = surface.frames_presented();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(surface.frames_presented(), presented);
    assert!(!registry.is_bound("canvas"));
    assert!(registry.bind("canvas", surface).is_ok());
}
