mod common;

use cgmath::{Matrix4, Vector3};

use ember::config::{BloomSettings, RenderPath, RendererConfig};
use ember::gfx::backend::{HeadlessBackend, TextureKind};
use ember::gfx::rendering::DrawUniforms;
use ember::gfx::resources::ModelHandle;
use ember::{Renderer, ResourceCache};

/// Extract, ten blur passes, composite.
const BLOOM_DRAWS: u32 = 12;

struct Fixture {
    gpu: HeadlessBackend,
    cache: ResourceCache,
    model: ModelHandle,
}

fn load_scene(test: &str) -> Fixture {
    let dir = common::fixture_dir(test);
    let path = common::write_scene(&dir);
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();
    let model = cache.create_model(&mut gpu, &path).expect("scene imports");
    Fixture { gpu, cache, model }
}

fn camera() -> (Matrix4<f32>, Vector3<f32>) {
    (Matrix4::from_scale(1.0), Vector3::new(0.0, 0.0, 5.0))
}

fn uniforms_of(bytes: &[u8]) -> DrawUniforms {
    bytemuck::pod_read_unaligned(bytes)
}

#[test]
fn test_forward_frame_draws_every_mesh_then_bloom() {
    let Fixture { mut gpu, cache, model } = load_scene("forward");
    let mut renderer = Renderer::init(&mut gpu, RendererConfig::default()).expect("init");
    let (view_proj, eye) = camera();

    gpu.clear_commands();
    let stats = renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);

    assert_eq!(stats.models, 1);
    assert_eq!(stats.meshes, 2);
    assert_eq!(stats.draw_calls, 2 + BLOOM_DRAWS);
    assert_eq!(gpu.draw_count(), stats.draw_calls as usize);
    assert_eq!(stats.backend.backend, "Headless");
}

#[test]
fn test_deferred_frame_adds_lighting_pass() {
    let Fixture { mut gpu, cache, model } = load_scene("deferred");
    let config = RendererConfig::default().with_render_path(RenderPath::Deferred);
    let mut renderer = Renderer::init(&mut gpu, config).expect("init");
    let (view_proj, eye) = camera();

    let stats = renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);

    assert_eq!(stats.meshes, 2);
    assert_eq!(stats.draw_calls, 2 + 1 + BLOOM_DRAWS);
}

#[test]
fn test_inactive_models_are_skipped() {
    let Fixture { mut gpu, cache, model } = load_scene("inactive");
    let mut renderer = Renderer::init(&mut gpu, RendererConfig::default()).expect("init");
    let (view_proj, eye) = camera();

    model.borrow_mut().transform.active = false;
    let stats = renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);

    assert_eq!(stats.models, 0);
    assert_eq!(stats.meshes, 0);
    assert_eq!(stats.draw_calls, BLOOM_DRAWS);
}

#[test]
fn test_clones_draw_the_shared_tree_again() {
    let Fixture { mut gpu, mut cache, model } = load_scene("clones");
    let clone = cache.create_model_from(&model, "Second Crate");
    let mut renderer = Renderer::init(&mut gpu, RendererConfig::default()).expect("init");
    let (view_proj, eye) = camera();

    let stats = renderer.render(&mut gpu, &cache, view_proj, eye, &[model, clone]);

    assert_eq!(stats.models, 2);
    assert_eq!(stats.meshes, 4);
}

#[test]
fn test_missing_albedo_binds_magenta() {
    let Fixture { mut gpu, cache, model } = load_scene("magenta");
    let config = RendererConfig::default().with_bloom(BloomSettings {
        enabled: false,
        ..BloomSettings::default()
    });
    let mut renderer = Renderer::init(&mut gpu, config).expect("init");
    let (view_proj, eye) = camera();

    gpu.clear_commands();
    renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);

    let draws: Vec<_> = gpu.draws().cloned().collect();
    // Children draw before their parent: the lid, then the crate, then the composite
    assert_eq!(draws.len(), 3);

    let lid = uniforms_of(&draws[0].uniforms);
    assert_eq!(lid.texture_slots[0], 2);
    assert!(draws[0].textures[2].is_some());
    assert!(draws[0].textures[5].is_none());
    assert_eq!(lid.material[2], 1.0);
    assert_eq!(lid.material[3], 1.0);

    let wood = cache.material(1).and_then(|m| m.albedo_texture.clone()).expect("wood albedo");
    let crate_draw = uniforms_of(&draws[1].uniforms);
    assert_eq!(crate_draw.texture_slots[0], 5);
    assert_eq!(draws[1].textures[5], Some(wood.id()));
    // Missing normal and bump maps fall back to flat normal and black
    assert_eq!(crate_draw.texture_slots[1], 3);
    assert_eq!(crate_draw.texture_slots[2], 1);
}

#[test]
fn test_emissive_mesh_gets_same_inputs_on_both_paths() {
    let dir = common::fixture_dir("emissive");
    let path = common::write_lamp(&dir);
    let no_bloom = BloomSettings {
        enabled: false,
        ..BloomSettings::default()
    };

    let mut mesh_draws = Vec::new();
    for render_path in [RenderPath::Forward, RenderPath::Deferred] {
        let mut gpu = HeadlessBackend::new();
        let mut cache = ResourceCache::new();
        let model = cache.create_model(&mut gpu, &path).expect("lamp imports");
        let config = RendererConfig::default()
            .with_render_path(render_path)
            .with_bloom(no_bloom);
        let mut renderer = Renderer::init(&mut gpu, config).expect("init");
        let (view_proj, eye) = camera();

        gpu.clear_commands();
        renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);
        mesh_draws.push(gpu.draws().next().cloned().expect("mesh draw"));
    }

    let forward = uniforms_of(&mesh_draws[0].uniforms);
    let deferred = uniforms_of(&mesh_draws[1].uniforms);
    assert_eq!(forward, deferred);
    assert_eq!(forward.material[1], 1.0);
    assert_eq!(forward.emissive_color, [1.0, 0.5, 0.0, 1.0]);

    // G-buffer alpha channels carry data, so the geometry pass must not blend
    assert_eq!(mesh_draws[0].render_state.map(|s| s.blending), Some(true));
    assert_eq!(mesh_draws[1].render_state.map(|s| s.blending), Some(false));
}

#[test]
fn test_skybox_loads_from_config() {
    let dir = common::fixture_dir("skybox");
    let faces = common::write_skybox_faces(&dir);
    let Fixture { mut gpu, cache, model } = load_scene("skybox-scene");
    let config = RendererConfig::default().with_skybox(faces.each_ref().map(|f| f.as_str()));
    let mut renderer = Renderer::init(&mut gpu, config).expect("init");

    let skybox = renderer.skybox().expect("skybox loaded");
    assert_eq!(skybox.cubemap().kind(), TextureKind::Cube);
    assert_eq!(skybox.cubemap().width(), 4);

    let (view_proj, eye) = camera();
    let stats = renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);
    assert_eq!(stats.draw_calls, 2 + 1 + BLOOM_DRAWS);
}

#[test]
fn test_unreadable_skybox_is_skipped() {
    let dir = common::fixture_dir("skybox-missing");
    let missing = common::path_string(&dir.join("missing.png"));
    let faces = [missing.as_str(); 6];
    let mut gpu = HeadlessBackend::new();

    let renderer = Renderer::init(&mut gpu, RendererConfig::default().with_skybox(faces)).expect("init");
    assert!(renderer.skybox().is_none());
}

#[test]
fn test_light_list_is_bounded() {
    let mut gpu = HeadlessBackend::new();
    let config = RendererConfig::default().with_max_lights(2);
    let mut renderer = Renderer::init(&mut gpu, config).expect("init");

    let first = renderer.add_light().map(|l| l.id()).expect("first light");
    assert!(renderer.add_light().is_some());
    assert!(renderer.add_light().is_none());

    assert!(renderer.remove_light(first));
    assert!(!renderer.remove_light(first));
    let replacement = renderer.add_light().map(|l| l.id()).expect("room again");
    assert!(replacement > first);
    assert_eq!(renderer.lights().len(), 2);
}

#[test]
fn test_shutdown_then_cache_clean_up_leaves_nothing_alive() {
    let Fixture { mut gpu, mut cache, model } = load_scene("shutdown");
    let mut renderer = Renderer::init(&mut gpu, RendererConfig::default()).expect("init");
    let (view_proj, eye) = camera();
    renderer.render(&mut gpu, &cache, view_proj, eye, &[model]);

    renderer.shutdown(&mut gpu);
    cache.clean_up(&mut gpu);

    assert_eq!(gpu.live_textures(), 0);
    assert_eq!(gpu.live_vertex_arrays(), 0);
    assert_eq!(gpu.live_shaders(), 0);
    assert_eq!(gpu.live_buffers(), 0);
}
