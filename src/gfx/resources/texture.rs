//! Textures and the fixed texture slot table
//!
//! Images are decoded with the `image` crate and flipped vertically so that
//! row 0 is the bottom of the picture, matching the UV convention of
//! [`Vertex3D`](crate::gfx::scene::vertex::Vertex3D).

use std::path::Path;

use crate::error::{EmberError, Result};
use crate::gfx::backend::{GpuBackend, PixelFormat, TextureDesc, TextureId, TextureKind};

/// Fixed texture units. Everything below [`TextureSlot::Albedo`] always holds
/// one of the renderer's built-in default textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum TextureSlot {
    White = 0,
    Black = 1,
    Magenta = 2,
    FlatNormal = 3,
    TempAlbedo = 4,
    Albedo = 5,
    Specular = 6,
    Normal = 7,
    Emissive = 8,
    Bump = 9,
}

impl TextureSlot {
    pub const COUNT: usize = 10;
    /// First slot that takes a caller-provided texture.
    pub const FIRST_MATERIAL_SLOT: TextureSlot = TextureSlot::Albedo;

    pub const DEFAULTS: [TextureSlot; 5] = [
        TextureSlot::White,
        TextureSlot::Black,
        TextureSlot::Magenta,
        TextureSlot::FlatNormal,
        TextureSlot::TempAlbedo,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn is_default(self) -> bool {
        self < Self::FIRST_MATERIAL_SLOT
    }
}

/// Decoded, flipped pixel data ready for upload.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Vec<u8>,
}

/// Reads an image file. Images with an alpha channel decode to RGBA8,
/// everything else to RGB8.
pub fn decode_image(path: &Path) -> Result<DecodedImage> {
    let image = image::open(path)?.flipv();
    let (width, height) = (image.width(), image.height());

    let (format, pixels) = if image.color().has_alpha() {
        (PixelFormat::Rgba8, image.into_rgba8().into_raw())
    } else {
        (PixelFormat::Rgb8, image.into_rgb8().into_raw())
    };

    Ok(DecodedImage {
        width,
        height,
        format,
        pixels,
    })
}

/// GPU texture plus the metadata the cache dedups on.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    width: u32,
    height: u32,
    format: PixelFormat,
    kind: TextureKind,
    /// `None` for procedural textures, which are never matched by path.
    path: Option<String>,
}

impl Texture {
    /// Loads and uploads the image at `path`.
    pub fn from_file(gpu: &mut dyn GpuBackend, path: &str) -> Result<Self> {
        let image = decode_image(Path::new(path))?;
        let mut texture = Self::from_pixels(
            gpu,
            image.width,
            image.height,
            image.format,
            &image.pixels,
            path,
        );
        texture.path = Some(path.to_owned());
        Ok(texture)
    }

    /// Builds an unpathed texture from raw pixels.
    pub fn from_pixels(
        gpu: &mut dyn GpuBackend,
        width: u32,
        height: u32,
        format: PixelFormat,
        pixels: &[u8],
        label: &str,
    ) -> Self {
        let id = gpu.create_texture(&TextureDesc::new_2d(label, width, height, format));
        let texture = Self {
            id,
            width,
            height,
            format,
            kind: TextureKind::D2,
            path: None,
        };
        texture.set_data(gpu, pixels);
        texture
    }

    /// Loads six square faces (right, left, bottom, top, front, back) into a cubemap.
    pub fn cubemap_from_files(gpu: &mut dyn GpuBackend, faces: &[String; 6]) -> Result<Self> {
        let mut decoded = Vec::with_capacity(6);
        for face in faces {
            let image = decode_image(Path::new(face))?;
            let rgba = match image.format {
                PixelFormat::Rgb8 => expand_rgb_to_rgba(&image.pixels),
                _ => image.pixels,
            };
            decoded.push((image.width, image.height, rgba));
        }

        let (size, _, _) = decoded[0];
        let expected = size as usize * size as usize * 4;
        for (_, _, pixels) in &decoded {
            if pixels.len() != expected {
                return Err(EmberError::TextureSize {
                    expected,
                    actual: pixels.len(),
                });
            }
        }

        let id = gpu.create_texture(&TextureDesc::new_cube("Skybox", size, PixelFormat::Rgba8));
        for (layer, (_, _, pixels)) in decoded.iter().enumerate() {
            gpu.write_texture(id, layer as u32, pixels);
        }

        Ok(Self {
            id,
            width: size,
            height: size,
            format: PixelFormat::Rgba8,
            kind: TextureKind::Cube,
            path: Some(faces[0].clone()),
        })
    }

    /// Replaces the whole texture content.
    ///
    /// # Panics
    /// Panics when `pixels` does not hold exactly `width * height * bpp` bytes.
    pub fn set_data(&self, gpu: &mut dyn GpuBackend, pixels: &[u8]) {
        let expected = self.width as usize * self.height as usize * self.format.bytes_per_pixel();
        assert_eq!(
            pixels.len(),
            expected,
            "Data passed must be the same size as the entire texture"
        );
        gpu.write_texture(self.id, 0, pixels);
    }

    pub fn destroy(&self, gpu: &mut dyn GpuBackend) {
        gpu.destroy_texture(self.id);
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    /// Source file for loaded textures, `None` for generated ones.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

pub(crate) fn expand_rgb_to_rgba(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .flat_map(|px| [px[0], px[1], px[2], 255])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::backend::HeadlessBackend;

    #[test]
    fn test_slot_table() {
        assert_eq!(TextureSlot::Albedo.index(), 5);
        assert_eq!(TextureSlot::Bump.index(), 9);
        assert!(TextureSlot::TempAlbedo.is_default());
        assert!(!TextureSlot::Albedo.is_default());
    }

    #[test]
    fn test_from_pixels_is_unpathed() {
        let mut gpu = HeadlessBackend::new();
        let texture = Texture::from_pixels(&mut gpu, 2, 1, PixelFormat::Rgb8, &[0; 6], "tiny");
        assert!(texture.path().is_none());
        assert_eq!(gpu.texture_data(texture.id(), 0).unwrap().len(), 6);
    }

    #[test]
    #[should_panic(expected = "same size")]
    fn test_set_data_size_mismatch() {
        let mut gpu = HeadlessBackend::new();
        let texture = Texture::from_pixels(&mut gpu, 1, 1, PixelFormat::Rgba8, &[0; 4], "px");
        texture.set_data(&mut gpu, &[0; 3]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut gpu = HeadlessBackend::new();
        assert!(Texture::from_file(&mut gpu, "/definitely/not/here.png").is_err());
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn test_expand_rgb() {
        assert_eq!(expand_rgb_to_rgba(&[1, 2, 3, 4, 5, 6]), vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }
}
