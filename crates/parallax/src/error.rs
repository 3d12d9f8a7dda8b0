/// Failure taxonomy shared by the render session, the GPU backend and the input sources.
///
/// Startup variants (`Initialization`, `ShaderCompile`, `Link`) are terminal and bubble to the
/// caller. Everything else is absorbed by the session, which keeps its last-known-good state.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no usable GPU context: {0}")]
    Initialization(String),
    #[error("failed to compile {stage} shader: {diagnostics}")]
    ShaderCompile {
        stage: &'static str,
        diagnostics: String,
    },
    #[error("failed to link render pipeline: {0}")]
    Link(String),
    #[error("failed to load texture '{name}': {reason}")]
    TextureLoad { name: String, reason: String },
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimension { width: f32, height: f32 },
    #[error("{source_name} input permission denied")]
    PermissionDenied { source_name: &'static str },
    #[error("unknown demo '{0}'")]
    UnknownDemo(String),
    #[error("invalid thresholds {horizontal}/{vertical}: both must be positive and finite")]
    InvalidThresholds { horizontal: f32, vertical: f32 },
    #[error("invalid demo table: {0}")]
    InvalidDemoTable(String),
    #[error("frame slot pool has been closed")]
    PoolClosed,
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

impl RenderError {
    pub(crate) fn texture_load(name: &str, reason: impl std::fmt::Display) -> Self {
        RenderError::TextureLoad {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures that must stop the renderer at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::Initialization(_)
                | RenderError::ShaderCompile { .. }
                | RenderError::Link(_)
        )
    }

    pub fn as_surface_error(&self) -> Option<&wgpu::SurfaceError> {
        match self {
            RenderError::Surface(err) => Some(err),
            _ => None,
        }
    }
}
