use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use parallax::{
    AssetDirectory, DecodedImage, DemoDescriptor, DemoRegistry, FrameBackend, FrameOutcome,
    FrameSubmission, InputMode, ManualTimeSource, ParallaxUniforms, PointerSource, RenderError,
    RenderSession, Thresholds, Viewport,
};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
struct Uploaded {
    name: String,
    size: (u32, u32),
}

#[derive(Default)]
struct Recorder {
    uploads: Vec<Uploaded>,
    frames: Vec<(ParallaxUniforms, String)>,
}

impl FrameBackend for Recorder {
    type Texture = Uploaded;

    fn upload_texture(&mut self, image: &DecodedImage) -> Result<Uploaded, RenderError> {
        assert_eq!(
            image.pixels.len(),
            (image.width * image.height * 4) as usize,
            "decoded images are tightly packed RGBA"
        );
        let uploaded = Uploaded {
            name: image.name.clone(),
            size: (image.width, image.height),
        };
        self.uploads.push(uploaded.clone());
        Ok(uploaded)
    }

    fn submit_frame(&mut self, frame: FrameSubmission<'_, Uploaded>) -> Result<(), RenderError> {
        self.frames.push((frame.uniforms, frame.textures.color.name.clone()));
        Ok(())
    }

    fn wait_idle(&mut self) {}
}

fn write_png(root: &Path, name: &str, width: u32, height: u32, shade: u8) {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbaImage::from_pixel(width, height, Rgba([shade, shade, shade, 255]))
        .save(&path)
        .unwrap();
}

fn registry() -> Arc<DemoRegistry> {
    Arc::new(
        DemoRegistry::from_descriptors(vec![
            DemoDescriptor::new(
                "wide",
                "Wide",
                "img/wide.png",
                "img/wide-map.png",
                Thresholds::new(35.0, 15.0),
            ),
            DemoDescriptor::new(
                "square",
                "Square",
                "img/square.png",
                "img/square-map.png",
                Thresholds::new(15.0, 25.0),
            ),
        ])
        .unwrap(),
    )
}

fn session_for(root: &Path) -> RenderSession<Recorder> {
    let mut session = RenderSession::new(
        Recorder::default(),
        registry(),
        Arc::new(AssetDirectory::new(root)),
    )
    .with_clock(Box::new(ManualTimeSource::new(0.0)));
    session.prepare(Viewport::new(400, 400, 1.0)).unwrap();
    session
}

fn tick_until(
    session: &mut RenderSession<Recorder>,
    done: impl Fn(&RenderSession<Recorder>) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(session) {
        assert!(Instant::now() < deadline, "condition never reached");
        session.tick().unwrap();
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn demos_load_from_disk_and_letterbox() {
    let assets = TempDir::new().unwrap();
    write_png(assets.path(), "img/wide.png", 400, 200, 200);
    write_png(assets.path(), "img/wide-map.png", 400, 200, 128);
    write_png(assets.path(), "img/square.png", 64, 64, 50);
    write_png(assets.path(), "img/square-map.png", 64, 64, 255);

    let mut session = session_for(assets.path());
    assert_eq!(session.active_demo().unwrap().id, "wide");
    assert_eq!(session.tick().unwrap(), FrameOutcome::Drawn);

    let (uniforms, color) = session.backend().frames[0].clone();
    assert_eq!(color, "img/wide.png");
    assert_eq!(session.backend().uploads[0].size, (400, 200));
    assert_eq!(uniforms.resolution, [400.0, 400.0, 1.0, 0.5]);
    assert_eq!(uniforms.threshold, [35.0, 15.0]);

    session.set_active_demo("square").unwrap();
    tick_until(&mut session, |s| s.active_demo().map(|d| d.id.as_str()) == Some("square"));
    assert_eq!(session.thresholds(), Some(Thresholds::new(15.0, 25.0)));
    assert_eq!(session.scale().x, 1.0);
    assert_eq!(session.scale().y, 1.0);
    assert_eq!(session.backend().uploads.len(), 4);

    // Both wide textures are cached, so switching back never re-reads the files.
    fs::remove_file(assets.path().join("img/wide.png")).unwrap();
    session.set_active_demo("wide").unwrap();
    assert_eq!(session.active_demo().unwrap().id, "wide");
    assert!(session.pending_demo().is_none());
    assert_eq!(session.backend().uploads.len(), 4);
}

#[test]
fn missing_initial_images_render_placeholders() {
    let assets = TempDir::new().unwrap();
    let mut session = session_for(assets.path());

    assert_eq!(session.active_demo().unwrap().id, "wide");
    assert_eq!(session.tick().unwrap(), FrameOutcome::Drawn);
    let (uniforms, color) = session.backend().frames[0].clone();
    assert_eq!(color, "placeholder:color");
    assert_eq!([uniforms.resolution[2], uniforms.resolution[3]], [1.0, 1.0]);
}

#[test]
fn undecodable_depth_map_keeps_previous_demo() {
    let assets = TempDir::new().unwrap();
    write_png(assets.path(), "img/wide.png", 400, 200, 200);
    write_png(assets.path(), "img/wide-map.png", 400, 200, 128);
    write_png(assets.path(), "img/square.png", 64, 64, 50);
    fs::write(assets.path().join("img/square-map.png"), b"not an image").unwrap();

    let mut session = session_for(assets.path());
    session.set_active_demo("square").unwrap();
    tick_until(&mut session, |s| s.pending_demo().is_none());

    assert_eq!(session.active_demo().unwrap().id, "wide");
    assert_eq!(session.thresholds(), Some(Thresholds::new(35.0, 15.0)));
    assert_eq!(session.tick().unwrap(), FrameOutcome::Drawn);
    let (_, color) = session.backend().frames.last().cloned().unwrap();
    assert_eq!(color, "img/wide.png");
}

#[test]
fn pointer_motion_eases_into_uniforms() {
    let assets = TempDir::new().unwrap();
    write_png(assets.path(), "img/wide.png", 40, 40, 200);
    write_png(assets.path(), "img/wide-map.png", 40, 40, 128);

    let mut session = session_for(assets.path());
    let pointer = PointerSource::new(400.0, 400.0);
    let attached = session.attach_inputs(InputMode::Pointer, pointer.clone(), None);
    assert_eq!(attached, ["pointer"]);

    pointer.pointer_moved(0.0, 0.0);
    session.tick().unwrap();
    let (uniforms, _) = session.backend().frames[0].clone();
    assert!((uniforms.tilt[0] - 0.05).abs() < 1e-6);
    assert!((uniforms.tilt[1] - 0.05).abs() < 1e-6);

    session.destroy();
    assert_eq!(session.tilt_target().load().x, 0.0);
}
