use serde::{Deserialize, Serialize};

use crate::backend::Texture2d;
use crate::errors::Result;
use crate::graph::{ExecuteContext, InitContext, PrepareContext, RenderPass};
use crate::resource::ResourceTicket;
use crate::view::DepthRange;

/// Full-screen pass at the end of the chain.
///
/// Binds its `Color` input (when something produces it this frame) to
/// `slot` and issues one full-screen draw. Never culled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessPass {
    /// Material slot receiving the color input.
    pub slot: String,
    /// Label of the full-screen draw.
    pub label: String,
    /// Depth range used while drawing.
    pub depth_range: DepthRange,
    #[serde(skip)]
    input: ResourceTicket<Texture2d>,
}

impl Default for PostProcessPass {
    fn default() -> Self {
        Self {
            slot: "ColorMap".to_string(),
            label: "PostProcess".to_string(),
            depth_range: DepthRange::IDENTITY,
            input: ResourceTicket::default(),
        }
    }
}

impl PostProcessPass {
    #[must_use]
    pub fn input(&self) -> ResourceTicket<Texture2d> {
        self.input
    }
}

impl RenderPass for PostProcessPass {
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.depth_range.validate()?;
        self.input = ctx.add_input("Color");
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut PrepareContext<'_>) -> Result<()> {
        ctx.reference_optional(self.input);
        Ok(())
    }

    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<()> {
        ctx.render().set_depth_range(self.depth_range)?;
        if let Some(color) = ctx.acquire_optional(self.input)? {
            ctx.backend().bind_texture(&self.slot, &color)?;
        }
        ctx.backend().draw_fullscreen(&self.label)?;
        Ok(())
    }

    fn is_used(&self, _referenced: bool) -> bool {
        true
    }
}
