// ============================================================================
// GPU SHADERS — all WGSL code kept inline for containment
// ============================================================================
//
// Binding layout shared with `crate::uniforms`:
//   @group(0)  buffers   (BufferIndex)
//   @group(1)  textures  (TextureIndex)
//
// Struct layouts must mirror `CanvasUniforms`, `BrushParams` and
// `StampDispatch` byte for byte.

use crate::mask::EdgeConnectivity;

/// Placeholder line in `CANVAS_SHADER` swapped by [`canvas_shader`].
const CONNECTIVITY_DECL: &str = "const EIGHT_CONNECTED: bool = true;";

// ============================================================================
// CANVAS SHADER — image adjustment + class overlay, one pass per frame
// ============================================================================
//
// The vertex stage reads the quad from a uniform buffer by vertex_index, so
// no vertex buffer layout is needed.  The fragment stage maps its canvas
// pixel to the image through the inverse transform, fetches the image texel
// and the mask cell with `textureLoad` (nearest), decides fill vs edge from
// the neighbouring cells and blends.  Everything outside the image is
// transparent.
pub const CANVAS_SHADER: &str = r#"
const CLASS_SLOTS: u32 = 9u;
const EIGHT_CONNECTED: bool = true;

struct CanvasUniforms {
    transform: mat3x3<f32>,
    inverse_transform: mat3x3<f32>,
    image_contrast: f32,
    image_brightness: f32,
    mask_fill_alpha: f32,
    mask_edge_alpha: f32,
    canvas_size: vec2<f32>,
    image_size: vec2<f32>,
    mask_size: vec2<f32>,
    mask_scale_factor: f32,
    _padding2: f32,
    class_colors: array<vec4<f32>, 9>,
};

struct QuadVertices {
    vertices: array<vec4<f32>, 6>,
};

@group(0) @binding(0) var<uniform> u: CanvasUniforms;
@group(0) @binding(1) var<uniform> quad: QuadVertices;
@group(1) @binding(0) var image_tex: texture_2d<f32>;
@group(1) @binding(1) var mask_tex: texture_2d<u32>;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_canvas(@builtin(vertex_index) vi: u32) -> VertexOutput {
    let v = quad.vertices[vi];
    var out: VertexOutput;
    out.position = vec4<f32>(v.xy, 0.0, 1.0);
    out.uv = v.zw;
    return out;
}

fn mask_class(cell: vec2<i32>) -> u32 {
    return textureLoad(mask_tex, cell, 0).r;
}

// Out-of-range neighbours count as the same class.
fn is_edge(cell: vec2<i32>, class_id: u32, size: vec2<i32>) -> bool {
    for (var dy: i32 = -1; dy <= 1; dy = dy + 1) {
        for (var dx: i32 = -1; dx <= 1; dx = dx + 1) {
            if (dx == 0 && dy == 0) {
                continue;
            }
            if (!EIGHT_CONNECTED && dx != 0 && dy != 0) {
                continue;
            }
            let n = cell + vec2<i32>(dx, dy);
            if (n.x < 0 || n.y < 0 || n.x >= size.x || n.y >= size.y) {
                continue;
            }
            if (mask_class(n) != class_id) {
                return true;
            }
        }
    }
    return false;
}

@fragment
fn fs_canvas(in: VertexOutput) -> @location(0) vec4<f32> {
    // Framebuffer coordinates are canvas pixel centres (x + 0.5).
    let canvas = in.position.xy;
    let ip = (u.inverse_transform * vec3<f32>(canvas, 1.0)).xy;
    if (ip.x < 0.0 || ip.y < 0.0 || ip.x >= u.image_size.x || ip.y >= u.image_size.y) {
        return vec4<f32>(0.0);
    }

    let src = textureLoad(image_tex, vec2<i32>(floor(ip)), 0);
    let rgb = clamp(
        (src.rgb - vec3<f32>(0.5)) * u.image_contrast + vec3<f32>(0.5 + u.image_brightness),
        vec3<f32>(0.0),
        vec3<f32>(1.0)
    );

    let msize = vec2<i32>(u.mask_size);
    let scale = u.mask_size / max(u.image_size, vec2<f32>(1.0));
    let cell = clamp(vec2<i32>(floor(ip * scale)), vec2<i32>(0), msize - vec2<i32>(1));
    let raw = mask_class(cell);
    if (raw == 0u) {
        return vec4<f32>(rgb, src.a);
    }

    let class_id = min(raw, CLASS_SLOTS - 1u);
    var alpha = u.mask_fill_alpha;
    if (is_edge(cell, raw, msize)) {
        alpha = u.mask_edge_alpha;
    }
    let cc = u.class_colors[class_id];
    alpha = clamp(alpha * cc.a, 0.0, 1.0);
    return vec4<f32>(mix(rgb, cc.rgb, alpha), src.a);
}
"#;

/// Canvas shader source specialised for the given edge connectivity.
pub fn canvas_shader(connectivity: EdgeConnectivity) -> String {
    match connectivity {
        EdgeConnectivity::Eight => CANVAS_SHADER.to_string(),
        EdgeConnectivity::Four => {
            CANVAS_SHADER.replace(CONNECTIVITY_DECL, "const EIGHT_CONNECTED: bool = false;")
        }
    }
}

// ============================================================================
// BRUSH STAMP SHADER — paint / erase one circular stamp
// ============================================================================
//
// Dispatched over the clipped stamp bounding box only.  Reads the current
// mask from a sampled texture and writes every cell of the box to a scratch
// storage texture; the caller copies the box back into the mask afterwards.
// Cell centres sit at +0.5 and the circle is inclusive.
pub const BRUSH_STAMP_SHADER: &str = r#"
struct BrushParams {
    center: vec2<f32>,
    radius: f32,
    paint_value: u32,     // low byte: 1 = paint, 0 = erase
};

struct StampDispatch {
    origin: vec2<u32>,
    extent: vec2<u32>,
    active_class: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
};

@group(0) @binding(0) var<uniform> brush: BrushParams;
@group(0) @binding(1) var<uniform> region: StampDispatch;
@group(1) @binding(0) var output_tex: texture_storage_2d<r32uint, write>;
@group(1) @binding(1) var mask_in: texture_2d<u32>;

@compute @workgroup_size(16, 16)
fn cs_brush_stamp(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= region.extent.x || gid.y >= region.extent.y) {
        return;
    }
    let p = vec2<i32>(region.origin + gid.xy);
    var class_id = textureLoad(mask_in, p, 0).r;

    let d = vec2<f32>(p) + vec2<f32>(0.5) - brush.center;
    if (d.x * d.x + d.y * d.y <= brush.radius * brush.radius) {
        if ((brush.paint_value & 0xffu) != 0u) {
            class_id = region.active_class;
        } else if (class_id == region.active_class) {
            class_id = 0u;
        }
    }
    textureStore(output_tex, p, vec4<u32>(class_id, 0u, 0u, 0u));
}
"#;

/// Workgroup edge length of `cs_brush_stamp`.
pub const STAMP_WORKGROUP: u32 = 16;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::CLASS_SLOTS;

    #[test]
    fn class_color_array_matches_slot_count() {
        let decl = format!("class_colors: array<vec4<f32>, {}>", CLASS_SLOTS);
        assert!(CANVAS_SHADER.contains(&decl));
        assert!(CANVAS_SHADER.contains(&format!("const CLASS_SLOTS: u32 = {}u;", CLASS_SLOTS)));
    }

    #[test]
    fn connectivity_substitution_hits_exactly_once() {
        assert_eq!(CANVAS_SHADER.matches(CONNECTIVITY_DECL).count(), 1);
        let four = canvas_shader(EdgeConnectivity::Four);
        assert!(!four.contains(CONNECTIVITY_DECL));
        assert!(four.contains("const EIGHT_CONNECTED: bool = false;"));
        assert_eq!(canvas_shader(EdgeConnectivity::Eight), CANVAS_SHADER);
    }

    #[test]
    fn workgroup_size_matches_constant() {
        let attr = format!("@workgroup_size({0}, {0})", STAMP_WORKGROUP);
        assert!(BRUSH_STAMP_SHADER.contains(&attr));
    }
}
