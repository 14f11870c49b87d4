//! Shader Stages
//!
//! "Fragment" in this crate means one stage's source text, not the pixel
//! stage exclusively; [`ShaderStage::Fragment`] is the pixel stage proper.

/// The five programmable pipeline stages a program fragment can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEval,
}

impl ShaderStage {
    /// All stages, in pipeline order.
    pub const ALL: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::Geometry,
        ShaderStage::TessControl,
        ShaderStage::TessEval,
    ];

    /// Number of distinct stages.
    pub const COUNT: usize = Self::ALL.len();

    /// Dense index for per-stage tables.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Human-readable stage name for logs and diagnostics.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessControl => "tess-control",
            ShaderStage::TessEval => "tess-eval",
        }
    }

}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
