use crate::context::ExecutionContext;
use crate::engine::{self, Flow};
use crate::error::Result;
use crate::node::EndConfig;

pub(super) fn execute(ctx: &mut ExecutionContext<'_>, config: &EndConfig) -> Result<Flow> {
    if config.ends_process {
        let root = ctx.instance.tokens.root();
        engine::end_token(ctx, root, false)?;
    } else {
        let token = ctx.token_id();
        let implicit = ctx.services().config.implicit_termination;
        engine::end_token(ctx, token, implicit)?;
    }
    Ok(Flow::Wait)
}
