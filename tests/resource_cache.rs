mod common;

use std::rc::Rc;

use ember::gfx::backend::{HeadlessBackend, PixelFormat};
use ember::gfx::resources::material::FALLBACK_MATERIAL;
use ember::gfx::resources::TextureSlot;
use ember::ResourceCache;

#[test]
fn test_model_import_builds_materials_and_mesh_tree() {
    let dir = common::fixture_dir("import");
    let path = common::write_scene(&dir);
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let model = cache.create_model(&mut gpu, &path).expect("scene imports");
    let model = model.borrow();
    assert_eq!(model.name, "scene");
    assert_eq!(model.path(), Some(path.as_str()));

    // Fallback plus the two scene materials
    assert_eq!(cache.material_count(), 3);
    let wood = cache.material(1).expect("wood material");
    assert_eq!(wood.name, "Wood");
    assert!((wood.smoothness - 0.25).abs() < 1e-6);
    assert!(!wood.is_transparent);
    assert!(wood.texture(TextureSlot::Albedo).is_some());

    let metal = cache.material(2).expect("metal material");
    assert_eq!(metal.name, "Metal");
    assert!(metal.is_transparent);
    assert!(metal.is_two_sided);
    assert!(metal.albedo_texture.is_none());

    let root = cache.mesh(model.root().expect("root mesh")).expect("root is registered");
    assert_eq!(root.name, "Crate");
    assert_eq!(root.material(), 1);
    assert_eq!(root.submeshes().len(), 1);

    let lid = cache.mesh(root.submeshes()[0]).expect("lid is registered");
    assert_eq!(lid.name, "Lid");
    assert_eq!(lid.material(), 2);
    assert_eq!(lid.parent(), Some(root.id()));
    assert_eq!(gpu.live_vertex_arrays(), 2);
}

#[test]
fn test_models_and_textures_are_deduplicated_by_path() {
    let dir = common::fixture_dir("dedup");
    let path = common::write_scene(&dir);
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let first = cache.create_model(&mut gpu, &path).expect("first load");
    let meshes = cache.mesh_count();
    let second = cache.create_model(&mut gpu, &path).expect("cached load");

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(cache.model_count(), 1);
    assert_eq!(cache.mesh_count(), meshes);
    assert_eq!(cache.texture_count(), 1);

    let wood_path = common::path_string(&dir.join("wood.png"));
    let texture = cache.create_texture(&mut gpu, &wood_path).expect("cached texture");
    let material_texture = cache.material(1).and_then(|m| m.albedo_texture.clone()).expect("albedo");
    assert!(Rc::ptr_eq(&texture, &material_texture));
    assert_eq!(cache.texture_count(), 1);
    assert_eq!(gpu.live_textures(), 1);
}

#[test]
fn test_second_import_offsets_materials_and_shares_textures() {
    let dir = common::fixture_dir("offset");
    let path = common::write_scene(&dir);
    let copy = common::path_string(&dir.join("copy.obj"));
    std::fs::copy(&path, &copy).expect("copy obj");

    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();
    cache.create_model(&mut gpu, &path).expect("first");
    let second = cache.create_model(&mut gpu, &copy).expect("second");

    let root = second.borrow().root().expect("root");
    assert_eq!(cache.mesh(root).map(|m| m.material()), Some(3));
    assert_eq!(cache.material(4).map(|m| m.name.as_str()), Some("Metal"));
    assert_eq!(cache.model_count(), 2);
    assert_eq!(cache.texture_count(), 1);
}

#[test]
fn test_failed_imports_return_none() {
    let dir = common::fixture_dir("broken");
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let missing = common::path_string(&dir.join("missing.obj"));
    assert!(cache.create_model(&mut gpu, &missing).is_none());

    let empty = dir.join("empty.obj");
    std::fs::write(&empty, "v 0 0 0\nv 1 0 0\n").expect("write obj");
    assert!(cache.create_model(&mut gpu, &common::path_string(&empty)).is_none());

    assert_eq!(cache.model_count(), 0);
    assert!(cache.create_texture(&mut gpu, &common::path_string(&dir.join("nope.png"))).is_none());
    assert_eq!(cache.texture_count(), 0);
}

#[test]
fn test_ids_are_never_reused() {
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let a = cache.create_mesh(None, FALLBACK_MATERIAL, None);
    let b = cache.create_mesh(None, FALLBACK_MATERIAL, None);
    cache.delete_mesh_references(&mut gpu, b);
    let c = cache.create_mesh(None, FALLBACK_MATERIAL, None);
    assert!(a < b && b < c);

    let m1 = cache.create_material("One").id();
    cache.delete_material_references(m1);
    let m2 = cache.create_material("Two").id();
    assert!(m2 > m1);
}

#[test]
fn test_deleted_material_falls_back() {
    let mut cache = ResourceCache::new();
    let material = cache.create_material("Stone.png").id();
    assert_eq!(cache.material(material).map(|m| m.name.as_str()), Some("Stone"));

    let mesh = cache.create_mesh(None, material, None);
    cache.delete_material_references(material);

    assert_eq!(cache.mesh(mesh).map(|m| m.material()), Some(FALLBACK_MATERIAL));
    assert!(cache.mesh(mesh).is_some_and(|m| m.uses_fallback_material()));
    assert_eq!(cache.resolve_material(material).map(|m| m.id()), Some(FALLBACK_MATERIAL));

    // The fallback survives deletion attempts
    cache.delete_material_references(FALLBACK_MATERIAL);
    assert!(cache.material(FALLBACK_MATERIAL).is_some());
}

#[test]
fn test_mesh_tree_stays_consistent() {
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let root = cache.create_mesh(None, FALLBACK_MATERIAL, None);
    let child = cache.create_mesh(None, FALLBACK_MATERIAL, Some(root));
    let grandchild = cache.create_mesh(None, FALLBACK_MATERIAL, Some(child));

    // Cycles are refused
    assert!(!cache.add_submesh(grandchild, root));

    // Reparenting moves the node
    assert!(cache.add_submesh(root, grandchild));
    assert!(cache.mesh(child).is_some_and(|m| m.submeshes().is_empty()));
    assert_eq!(cache.mesh(grandchild).and_then(|m| m.parent()), Some(root));

    cache.delete_mesh_references(&mut gpu, child);
    assert!(cache.mesh(child).is_none());
    assert_eq!(cache.mesh(root).map(|m| m.submeshes().to_vec()), Some(vec![grandchild]));

    cache.delete_mesh_references(&mut gpu, root);
    assert_eq!(cache.mesh_count(), 0);
}

#[test]
fn test_deleting_root_mesh_clears_model_root() {
    let dir = common::fixture_dir("delete-root");
    let path = common::write_scene(&dir);
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let model = cache.create_model(&mut gpu, &path).expect("import");
    let root = model.borrow().root().expect("root");
    cache.delete_mesh_references(&mut gpu, root);

    assert!(model.borrow().root().is_none());
    assert_eq!(cache.mesh_count(), 0);
    assert_eq!(gpu.live_vertex_arrays(), 0);
}

#[test]
fn test_clone_gets_new_name_and_shares_root() {
    let dir = common::fixture_dir("clone");
    let path = common::write_scene(&dir);
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    let source = cache.create_model(&mut gpu, &path).expect("import");
    let moved = source.borrow().transform.with_translation(1.0, 2.0, 3.0);
    source.borrow_mut().transform = moved;
    let clone = cache.create_model_from(&source, "Crate Copy");

    assert_eq!(source.borrow().name, "scene");
    assert_eq!(clone.borrow().name, "Crate Copy");
    assert_eq!(clone.borrow().root(), source.borrow().root());
    assert_eq!(clone.borrow().transform, source.borrow().transform);
    assert_eq!(cache.model_count(), 2);
}

#[test]
fn test_clean_up_releases_everything() {
    let dir = common::fixture_dir("clean-up");
    let path = common::write_scene(&dir);
    let mut gpu = HeadlessBackend::new();
    let mut cache = ResourceCache::new();

    cache.create_model(&mut gpu, &path).expect("import");
    cache.create_texture_from_pixels(&mut gpu, 1, 1, PixelFormat::Rgba8, &[0, 0, 0, 255], "Pixel");
    assert!(cache.references_report().len() > 4);

    cache.clean_up(&mut gpu);

    assert_eq!(cache.model_count(), 0);
    assert_eq!(cache.mesh_count(), 0);
    assert_eq!(cache.texture_count(), 0);
    assert_eq!(cache.material_count(), 1);
    assert_eq!(gpu.live_textures(), 0);
    assert_eq!(gpu.live_vertex_arrays(), 0);
}
