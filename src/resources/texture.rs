//! Texture loading and upload

use crate::backend::{GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage};
use crate::resources::ResourceError;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// Decoded RGBA8 pixels, top row first
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|source| ResourceError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from encoded bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, ResourceError> {
        let img = image::load_from_memory(bytes).map_err(|source| ResourceError::Image {
            path: name.into(),
            source,
        })?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Treat the pixels as linear data rather than sRGB colour
    pub fn into_linear(self) -> Self {
        Self {
            format: TextureFormat::Rgba8Unorm,
            ..self
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8UnormSrgb,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A texture living on the GPU
#[derive(Debug)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub name: String,
}

impl GpuTexture {
    /// Create and upload texture to GPU
    pub fn create(backend: &mut dyn GraphicsBackend, data: &TextureData) -> Result<Self, ResourceError> {
        if data.is_empty() {
            return Err(ResourceError::EmptyTexture(data.name.clone()));
        }
        let handle = backend.create_texture(
            &TextureDescriptor {
                label: Some(data.name.clone()),
                width: data.width,
                height: data.height,
                format: data.format,
                usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
            },
            Some(&data.data),
        )?;

        Ok(Self {
            handle,
            width: data.width,
            height: data.height,
            format: data.format,
            name: data.name.clone(),
        })
    }

    /// Decode a file and upload it
    pub fn load(backend: &mut dyn GraphicsBackend, path: &Path) -> Result<Self, ResourceError> {
        let data = TextureData::from_file(path)?;
        Self::create(backend, &data)
    }

    /// Decode a file and upload it without sRGB decoding on sample
    pub fn load_linear(backend: &mut dyn GraphicsBackend, path: &Path) -> Result<Self, ResourceError> {
        let data = TextureData::from_file(path)?.into_linear();
        Self::create(backend, &data)
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_texture(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn missing_file_is_an_error() {
        let err = TextureData::from_file("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, ResourceError::Image { .. }));
    }

    #[test]
    fn decodes_and_uploads_png() {
        let mut png = Vec::new();
        let img = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let data = TextureData::from_bytes(&png, "mem.png").unwrap();
        assert_eq!((data.width, data.height), (4, 2));
        assert_eq!(data.format, TextureFormat::Rgba8UnormSrgb);

        let mut backend = RecordingBackend::default();
        let gpu = GpuTexture::create(&mut backend, &data).unwrap();
        assert_eq!(gpu.aspect(), 2.0);
        let readback = backend.read_texture(gpu.handle).unwrap();
        assert_eq!(&readback.data[..4], &[10, 20, 30, 255]);
        gpu.release(&mut backend);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn linear_data_keeps_its_bytes() {
        let data = TextureData::solid_color([128, 128, 128, 255], "grey").into_linear();
        assert_eq!(data.format, TextureFormat::Rgba8Unorm);
        assert_eq!(data.data, [128, 128, 128, 255]);
    }
}
