//! Array mutation subtags.
//!
//! Every one of these accepts either a serialized array literal or the name
//! of a variable holding an array. Mutating a variable-resolved array writes
//! the result back to the variable and produces no output; mutating a
//! literal array returns the new serialization instead.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::Value;

use crate::json;
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;
use crate::subtags::{
    parse_bool, Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler,
    SubtagRegistry,
};

pub fn register_array_subtags(registry: &mut SubtagRegistry) {
    registry.register(
        SubtagDef::new("push", SubtagCategory::Array, PushSubtag).signature(Signature::new(vec![
            Parameter::required("array"),
            Parameter::variadic("values", 1),
        ])),
    );

    registry.register(
        SubtagDef::new("pop", SubtagCategory::Array, PopSubtag)
            .signature(Signature::new(vec![Parameter::required("array")])),
    );

    registry.register(
        SubtagDef::new("shift", SubtagCategory::Array, ShiftSubtag)
            .signature(Signature::new(vec![Parameter::required("array")])),
    );

    registry.register(
        SubtagDef::new("sort", SubtagCategory::Array, SortSubtag)
            .signature(Signature::new(vec![Parameter::required("array")]))
            .signature(Signature::new(vec![
                Parameter::required("array"),
                Parameter::optional_or("descending", "false"),
            ])),
    );

    registry.register(
        SubtagDef::new("reverse", SubtagCategory::Array, ReverseSubtag)
            .signature(Signature::new(vec![Parameter::required("array")])),
    );

    registry.register(
        SubtagDef::new("shuffle", SubtagCategory::Array, ShuffleSubtag)
            .signature(Signature::new(vec![Parameter::required("array")])),
    );
}

struct PushSubtag;

#[async_trait]
impl SubtagHandler for PushSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let source = args.eval(ctx, 0).await?;
        let mut array = ctx.resolve_array(&source).await?;
        for index in 1..args.len() {
            array.values.push(Value::String(args.eval(ctx, index).await?));
        }
        Ok(written(ctx, array))
    }
}

struct PopSubtag;

#[async_trait]
impl SubtagHandler for PopSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let source = args.eval(ctx, 0).await?;
        let mut array = ctx.resolve_array(&source).await?;
        let removed = array.values.pop();
        ctx.write_array(array);
        // The removed element is the output, whether or not a write-back
        // happened.
        Ok(match removed {
            Some(value) => Output::Text(json::display(&value)),
            None => Output::None,
        })
    }
}

struct ShiftSubtag;

#[async_trait]
impl SubtagHandler for ShiftSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let source = args.eval(ctx, 0).await?;
        let mut array = ctx.resolve_array(&source).await?;
        let removed = if array.values.is_empty() {
            None
        } else {
            Some(array.values.remove(0))
        };
        ctx.write_array(array);
        Ok(match removed {
            Some(value) => Output::Text(json::display(&value)),
            None => Output::None,
        })
    }
}

struct SortSubtag;

#[async_trait]
impl SubtagHandler for SortSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let source = args.eval(ctx, 0).await?;
        let mut array = ctx.resolve_array(&source).await?;
        let descending_text = args.eval_or(ctx, 1, "false").await?;
        let descending = parse_bool(&descending_text).map_err(|kind| ctx.raise(kind))?;
        array.sort(descending);
        Ok(written(ctx, array))
    }
}

struct ReverseSubtag;

#[async_trait]
impl SubtagHandler for ReverseSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let source = args.eval(ctx, 0).await?;
        let mut array = ctx.resolve_array(&source).await?;
        array.values.reverse();
        Ok(written(ctx, array))
    }
}

struct ShuffleSubtag;

#[async_trait]
impl SubtagHandler for ShuffleSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let source = args.eval(ctx, 0).await?;
        let mut array = ctx.resolve_array(&source).await?;
        array.values.shuffle(&mut ctx.rng);
        Ok(written(ctx, array))
    }
}

/// Persist-or-serialize tail shared by mutations that keep the whole array.
fn written(ctx: &mut TagContext, array: crate::arrays::TagArray) -> Output {
    match ctx.write_array(array) {
        Some(encoded) => Output::Text(encoded),
        None => Output::None,
    }
}
