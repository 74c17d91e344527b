//! Single-texel GPU → CPU readback.
//!
//! The average scene luminance lives in the last (1×1) mip of the scene
//! target. Reading it stalls until the GPU has finished the frame so far,
//! which is acceptable for one texel per frame.

use half::f16;

use crate::errors::{GloamError, Result};

/// Rec. 709 luma weights.
const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Staging buffer reused across frames.
pub struct LuminanceReadback {
    buffer: wgpu::Buffer,
}

impl LuminanceReadback {
    pub fn new(device: &wgpu::Device) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Luminance Readback"),
            size: u64::from(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self { buffer }
    }

    /// Records the copy of the coarsest mip of `texture` into the staging
    /// buffer. The caller submits `encoder` before calling [`Self::resolve`].
    pub fn copy_last_mip(&self, encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
        let level = texture.mip_level_count().saturating_sub(1);
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Waits for the copy and returns the luminance of the texel.
    pub fn resolve(&self, device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<f32> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GloamError::Readback(e.to_string()))?;
        rx.recv()
            .map_err(|e| GloamError::Readback(e.to_string()))?
            .map_err(|e| GloamError::Readback(e.to_string()))?;

        let rgb = {
            let data = slice.get_mapped_range();
            decode_texel(&data, format)
        };
        self.buffer.unmap();

        let [r, g, b] = rgb.ok_or_else(|| {
            GloamError::Readback(format!("unsupported luminance format {format:?}"))
        })?;
        Ok(r * LUMA[0] + g * LUMA[1] + b * LUMA[2])
    }
}

fn decode_texel(data: &[u8], format: wgpu::TextureFormat) -> Option<[f32; 3]> {
    let half_at = |i: usize| -> f32 {
        f16::from_le_bytes([data[i * 2], data[i * 2 + 1]]).to_f32()
    };
    let float_at = |i: usize| -> f32 {
        f32::from_le_bytes([data[i * 4], data[i * 4 + 1], data[i * 4 + 2], data[i * 4 + 3]])
    };
    match format {
        wgpu::TextureFormat::Rgba16Float => Some([half_at(0), half_at(1), half_at(2)]),
        wgpu::TextureFormat::Rgba32Float => Some([float_at(0), float_at(1), float_at(2)]),
        wgpu::TextureFormat::R16Float => {
            let v = half_at(0);
            Some([v, v, v])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_half_float_texels() {
        let mut bytes = Vec::new();
        for v in [1.0f32, 0.5, 0.25, 1.0] {
            bytes.extend_from_slice(&f16::from_f32(v).to_le_bytes());
        }
        let rgb = decode_texel(&bytes, wgpu::TextureFormat::Rgba16Float).unwrap();
        assert_eq!(rgb, [1.0, 0.5, 0.25]);
    }

    #[test]
    fn rejects_unorm_formats() {
        assert!(decode_texel(&[0; 4], wgpu::TextureFormat::Rgba8Unorm).is_none());
    }
}
