//! JSON navigation subtags.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ErrorKind;
use crate::json;
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;
use crate::subtags::{
    Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler, SubtagRegistry,
};

pub fn register_json_subtags(registry: &mut SubtagRegistry) {
    registry.register(
        SubtagDef::new("jget", SubtagCategory::Json, JGetSubtag)
            .aliases(&["jsonget"])
            .signature(Signature::new(vec![
                Parameter::required("input"),
                Parameter::optional("path"),
            ])),
    );
}

struct JGetSubtag;

#[async_trait]
impl SubtagHandler for JGetSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let input = args.eval(ctx, 0).await?;
        let value = resolve_json(ctx, &input).await?;
        let path = args.eval(ctx, 1).await?;
        if path.is_empty() {
            return Ok(Output::Text(json::display(&value)));
        }
        let found = json::walk_path(&value, &path).map_err(|err| {
            ctx.raise(ErrorKind::JsonPathError {
                path: path.clone(),
                message: err.message,
            })
        })?;
        Ok(Output::Text(json::display(found)))
    }
}

/// JSON literals parse directly; anything else is tried as a variable name
/// and finally kept as a plain string value.
async fn resolve_json(ctx: &mut TagContext, input: &str) -> Result<Value, Interrupt> {
    if let Ok(value) = serde_json::from_str(input.trim()) {
        return Ok(value);
    }
    let stored = ctx
        .variables
        .get(input)
        .await
        .map_err(|e| ctx.store_failure(e))?;
    Ok(stored.unwrap_or_else(|| Value::String(input.to_string())))
}
