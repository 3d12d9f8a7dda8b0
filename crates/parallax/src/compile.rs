use std::borrow::Cow;

use wgpu::naga::ShaderStage;

use crate::error::RenderError;

/// Compiles the quad vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule, RenderError> {
    compile_stage(
        device,
        "parallax quad vertex",
        VERTEX_SHADER_GLSL,
        ShaderStage::Vertex,
        "vertex",
    )
}

/// Compiles the depth displacement fragment shader.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
) -> Result<wgpu::ShaderModule, RenderError> {
    compile_stage(
        device,
        "parallax fragment",
        FRAGMENT_SHADER_GLSL,
        ShaderStage::Fragment,
        "fragment",
    )
}

/// Creates a GLSL module inside a validation error scope so compile errors come back as values
/// instead of hitting the device's uncaptured error handler.
fn compile_stage(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    stage: ShaderStage,
    stage_name: &'static str,
) -> Result<wgpu::ShaderModule, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(source),
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        tracing::error!(stage = stage_name, %err, "shader compilation failed");
        return Err(RenderError::ShaderCompile {
            stage: stage_name,
            diagnostics: err.to_string(),
        });
    }
    Ok(module)
}

/// Quad vertex shader. Image coordinates run top-down, matching the row order of uploaded
/// textures, so the picture appears upright.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 a_position;
layout(location = 0) out vec2 v_uv;

void main() {
    v_uv = vec2(a_position.x * 0.5 + 0.5, 0.5 - a_position.y * 0.5);
    gl_Position = vec4(a_position, 0.0, 1.0);
}
";

/// Depth displacement shader.
///
/// The uniform block layout must match [`crate::uniforms::ParallaxUniforms`]. `resolution.zw`
/// carries the letterbox scale; pixels that fall outside the fitted image are drawn black.
const FRAGMENT_SHADER_GLSL: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 outColor;

layout(std140, set = 0, binding = 0) uniform ParallaxParams {
    vec4 resolution;
    vec2 tilt;
    vec2 threshold;
    float time;
    float pixelRatio;
    vec2 padding;
} params;

layout(set = 1, binding = 0) uniform texture2D colorTexture;
layout(set = 1, binding = 1) uniform sampler colorSampler;
layout(set = 1, binding = 2) uniform texture2D depthTexture;
layout(set = 1, binding = 3) uniform sampler depthSampler;

vec2 mirrored(vec2 v) {
    vec2 m = mod(v, vec2(2.0));
    return mix(m, vec2(2.0) - m, step(vec2(1.0), m));
}

void main() {
    vec2 uv = (v_uv - 0.5) / params.resolution.zw + 0.5;
    vec2 inside = step(vec2(0.0), uv) * step(uv, vec2(1.0));

    float depth = texture(sampler2D(depthTexture, depthSampler), mirrored(uv)).r;
    // v grows downward, so the vertical tilt is flipped to keep 'up' pointing up.
    vec2 offset = (depth - 0.5) * vec2(params.tilt.x, -params.tilt.y) / params.threshold;
    vec4 color = texture(sampler2D(colorTexture, colorSampler), mirrored(uv + offset));

    outColor = vec4(color.rgb * (inside.x * inside.y), 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::naga::front::glsl::{Frontend, Options};
    use wgpu::naga::valid::{Capabilities, ValidationFlags, Validator};

    fn parse_and_validate(source: &str, stage: ShaderStage) {
        let module = Frontend::default()
            .parse(&Options::from(stage), source)
            .unwrap_or_else(|err| panic!("{stage:?} shader failed to parse: {err:?}"));
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{stage:?} shader failed validation: {err:?}"));
    }

    #[test]
    fn shaders_parse_and_validate() {
        parse_and_validate(VERTEX_SHADER_GLSL, ShaderStage::Vertex);
        parse_and_validate(FRAGMENT_SHADER_GLSL, ShaderStage::Fragment);
    }

    #[test]
    fn fragment_block_matches_uniform_fields() {
        let block = FRAGMENT_SHADER_GLSL
            .split("uniform ParallaxParams {")
            .nth(1)
            .and_then(|rest| rest.split('}').next())
            .unwrap();
        let fields: Vec<_> = block
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        assert_eq!(
            fields,
            [
                "vec4 resolution;",
                "vec2 tilt;",
                "vec2 threshold;",
                "float time;",
                "float pixelRatio;",
                "vec2 padding;",
            ]
        );
    }

    #[test]
    fn textures_bind_color_then_depth() {
        assert!(FRAGMENT_SHADER_GLSL.contains("binding = 0) uniform texture2D colorTexture"));
        assert!(FRAGMENT_SHADER_GLSL.contains("binding = 2) uniform texture2D depthTexture"));
    }
}
