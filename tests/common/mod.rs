//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

pub const SCENE_OBJ: &str = "\
mtllib scene.mtl
o Crate
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl Wood.mtl
f 1/1/1 2/2/1 3/3/1 4/4/1
o Lid
v 0 0 1
v 1 0 1
v 1 1 1
usemtl Metal
f 5/1/1 6/2/1 7/3/1
";

pub const SCENE_MTL: &str = "\
newmtl Wood.mtl
Kd 0.8 0.6 0.4
Ks 0.1 0.1 0.1
Ns 64
d 1.0
map_Kd wood.png

newmtl Metal
Kd 0.5 0.5 0.5
Ks 1.0 1.0 1.0
Ns 128
d 0.5
";

pub const LAMP_OBJ: &str = "\
mtllib lamp.mtl
o Bulb
v 0 0 0
v 1 0 0
v 0 1 0
vn 0 0 1
usemtl Glow
f 1//1 2//1 3//1
";

pub const LAMP_MTL: &str = "\
newmtl Glow
Kd 0.2 0.2 0.2
Ke 1.0 0.5 0.0
Ns 32
";

/// Fresh directory under the system temp dir, unique per test.
pub fn fixture_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ember-{}-{}", test, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create fixture dir");
    dir
}

pub fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    image::RgbaImage::from_pixel(width, height, image::Rgba(color))
        .save(path)
        .expect("write png");
}

/// Writes `scene.obj`, `scene.mtl` and `wood.png` into `dir` and returns the OBJ path.
pub fn write_scene(dir: &Path) -> String {
    std::fs::write(dir.join("scene.obj"), SCENE_OBJ).expect("write obj");
    std::fs::write(dir.join("scene.mtl"), SCENE_MTL).expect("write mtl");
    write_png(&dir.join("wood.png"), 2, 2, [160, 120, 80, 255]);
    path_string(&dir.join("scene.obj"))
}

/// Writes a single emissive triangle and returns the OBJ path.
pub fn write_lamp(dir: &Path) -> String {
    std::fs::write(dir.join("lamp.obj"), LAMP_OBJ).expect("write obj");
    std::fs::write(dir.join("lamp.mtl"), LAMP_MTL).expect("write mtl");
    path_string(&dir.join("lamp.obj"))
}

/// Six 4x4 cubemap faces, returned in right, left, bottom, top, front, back order.
pub fn write_skybox_faces(dir: &Path) -> [String; 6] {
    ["right", "left", "bottom", "top", "front", "back"].map(|face| {
        let path = dir.join(format!("{}.png", face));
        write_png(&path, 4, 4, [40, 80, 160, 255]);
        path_string(&path)
    })
}

pub fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
