use serde::{Deserialize, Serialize};

use crate::backend::Texture2d;
use crate::errors::Result;
use crate::graph::{ExecuteContext, InitContext, PrepareContext, RenderPass};
use crate::resource::ResourceTicket;

/// Renames a texture: consumers of `Output` resolve to whatever `Input`
/// is connected to. Declares nothing, so it is always culled.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PassThroughPass {
    #[serde(skip)]
    input: ResourceTicket<Texture2d>,
    #[serde(skip)]
    output: ResourceTicket<Texture2d>,
}

impl PassThroughPass {
    #[must_use]
    pub fn input(&self) -> ResourceTicket<Texture2d> {
        self.input
    }

    #[must_use]
    pub fn output(&self) -> ResourceTicket<Texture2d> {
        self.output
    }
}

impl RenderPass for PassThroughPass {
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<()> {
        self.input = ctx.add_input("Input");
        self.output = ctx.add_output("Output");
        ctx.forward(self.output, self.input)
    }

    fn prepare(&mut self, _ctx: &mut PrepareContext<'_>) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, _ctx: &mut ExecuteContext<'_>) -> Result<()> {
        Ok(())
    }
}
