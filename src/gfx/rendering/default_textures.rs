//! Built-in fallback textures
//!
//! Five textures occupy the slots below [`TextureSlot::Albedo`]: white,
//! black, magenta (the "missing texture" marker), a flat normal and a "temp
//! albedo" bitmap. The first four are 1x1 texels.

use std::path::Path;

use crate::gfx::backend::{GpuBackend, PixelFormat};
use crate::gfx::resources::texture::{decode_image, Texture, TextureSlot};

/// Packed ABGR texel values, as written to memory they read RGBA.
const WHITE: u32 = 0xffff_ffff;
const BLACK: u32 = 0xff00_0000;
const MAGENTA: u32 = 0xffff_00ff;
const FLAT_NORMAL: u32 = 0xffff_8080;

const CHECKER_SIZE: u32 = 8;

fn texel(abgr: u32) -> [u8; 4] {
    abgr.to_le_bytes()
}

/// Grey checkerboard used when no temp albedo bitmap is configured.
fn checkerboard() -> Vec<u8> {
    let mut pixels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let v = if (x + y) % 2 == 0 { 200 } else { 90 };
            pixels.extend_from_slice(&[v, v, v, 255]);
        }
    }
    pixels
}

#[derive(Debug)]
pub struct DefaultTextures {
    textures: Vec<Texture>,
}

impl DefaultTextures {
    /// Uploads the five defaults. The temp albedo comes from `temp_albedo`
    /// when it decodes, otherwise it is a generated checkerboard.
    pub fn load(gpu: &mut dyn GpuBackend, temp_albedo: Option<&str>) -> Self {
        let mut textures = Vec::with_capacity(TextureSlot::DEFAULTS.len());
        for (slot, value) in [
            (TextureSlot::White, WHITE),
            (TextureSlot::Black, BLACK),
            (TextureSlot::Magenta, MAGENTA),
            (TextureSlot::FlatNormal, FLAT_NORMAL),
        ] {
            let label = format!("Default {:?}", slot);
            textures.push(Texture::from_pixels(gpu, 1, 1, PixelFormat::Rgba8, &texel(value), &label));
        }

        let decoded = temp_albedo.and_then(|path| match decode_image(Path::new(path)) {
            Ok(image) => Some(image),
            Err(err) => {
                log::warn!("Couldn't load temp albedo '{}': {}", path, err);
                None
            }
        });
        let temp = match decoded {
            Some(image) => Texture::from_pixels(
                gpu,
                image.width,
                image.height,
                image.format,
                &image.pixels,
                "Default TempAlbedo",
            ),
            None => Texture::from_pixels(
                gpu,
                CHECKER_SIZE,
                CHECKER_SIZE,
                PixelFormat::Rgba8,
                &checkerboard(),
                "Default TempAlbedo",
            ),
        };
        textures.push(temp);

        Self { textures }
    }

    /// Texture for a default slot, `None` for material slots.
    pub fn get(&self, slot: TextureSlot) -> Option<&Texture> {
        if !slot.is_default() {
            return None;
        }
        self.textures.get(slot.index() as usize)
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        for texture in &self.textures {
            texture.destroy(gpu);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::HeadlessBackend;

    #[test]
    fn test_texel_byte_order() {
        assert_eq!(texel(MAGENTA), [255, 0, 255, 255]);
        assert_eq!(texel(FLAT_NORMAL), [128, 128, 255, 255]);
        assert_eq!(texel(BLACK), [0, 0, 0, 255]);
    }

    #[test]
    fn test_defaults_upload() {
        let mut gpu = HeadlessBackend::new();
        let defaults = DefaultTextures::load(&mut gpu, None);
        assert_eq!(gpu.live_textures(), 5);

        let magenta = defaults.get(TextureSlot::Magenta).unwrap();
        assert_eq!(gpu.texture_data(magenta.id(), 0).unwrap(), &[255, 0, 255, 255]);
        assert!(defaults.get(TextureSlot::Albedo).is_none());

        let temp = defaults.get(TextureSlot::TempAlbedo).unwrap();
        assert_eq!(temp.width(), CHECKER_SIZE);
    }

    #[test]
    fn test_unreadable_temp_albedo_falls_back() {
        let mut gpu = HeadlessBackend::new();
        let defaults = DefaultTextures::load(&mut gpu, Some("/no/such/dice.png"));
        assert_eq!(defaults.get(TextureSlot::TempAlbedo).unwrap().width(), CHECKER_SIZE);
    }
}
