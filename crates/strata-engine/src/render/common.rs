//! Shared GPU types and utilities used by the quad renderer and the backend.

use bytemuck::{Pod, Zeroable};

use crate::coords::Rect;

/// Format of every texture the backend owns: uploads, render targets and
/// the default framebuffer. Contents are premultiplied.
pub(super) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

// ── blend ─────────────────────────────────────────────────────────────────

pub(super) fn premul_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

// ── quad vertex ───────────────────────────────────────────────────────────

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub(super) struct QuadVertex {
    pub pos: [f32; 2], // 0..1
}

impl QuadVertex {
    const ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub(super) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

pub(super) const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { pos: [0.0, 0.0] },
    QuadVertex { pos: [1.0, 0.0] },
    QuadVertex { pos: [1.0, 1.0] },
    QuadVertex { pos: [0.0, 1.0] },
];

pub(super) const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

// ── quad instance ─────────────────────────────────────────────────────────

/// One textured quad. Positions are NDC, computed on the CPU from device
/// pixels so the pipeline needs no viewport uniform.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(super) struct QuadInstance {
    pub dst_min: [f32; 2],
    pub dst_max: [f32; 2],
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    pub tint: [f32; 4], // premultiplied
}

impl QuadInstance {
    const ATTRS: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        1 => Float32x2, // dst_min
        2 => Float32x2, // dst_max
        3 => Float32x2, // uv_min
        4 => Float32x2, // uv_max
        5 => Float32x4  // tint
    ];

    pub(super) fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadInstance>() as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRS,
        }
    }

    /// Maps a device-pixel `dest` on a `target_w` × `target_h` target to NDC.
    pub(super) fn new(dest: Rect, uv: Rect, tint: [f32; 4], target_w: u32, target_h: u32) -> Self {
        let (w, h) = (target_w.max(1) as f32, target_h.max(1) as f32);
        let ndc = |x: f32, y: f32| [x / w * 2.0 - 1.0, 1.0 - y / h * 2.0];
        let max = dest.max();
        let uv_max = uv.max();
        Self {
            dst_min: ndc(dest.origin.x, dest.origin.y),
            dst_max: ndc(max.x, max.y),
            uv_min: [uv.origin.x, uv.origin.y],
            uv_max: [uv_max.x, uv_max.y],
            tint,
        }
    }
}

/// Row stride for texture-to-buffer copies (256-byte aligned).
pub(super) fn padded_bytes_per_row(width: u32) -> u32 {
    (width * 4).next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_maps_full_target_to_ndc() {
        let dest = Rect::new(0.0, 0.0, 100.0, 50.0);
        let q = QuadInstance::new(dest, Rect::new(0.0, 0.0, 1.0, 1.0), [1.0; 4], 100, 50);
        assert_eq!(q.dst_min, [-1.0, 1.0]);
        assert_eq!(q.dst_max, [1.0, -1.0]);
    }

    #[test]
    fn instance_keeps_mirrored_uv() {
        let uv = Rect::new(1.0, 0.0, -1.0, 1.0);
        let q = QuadInstance::new(Rect::new(0.0, 0.0, 1.0, 1.0), uv, [1.0; 4], 1, 1);
        assert_eq!(q.uv_min, [1.0, 0.0]);
        assert_eq!(q.uv_max, [0.0, 1.0]);
    }

    #[test]
    fn padded_rows_align_to_256() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }
}
