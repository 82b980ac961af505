//! Variable access subtags.
//!
//! Key prefixes (`~` scratch, author, guild, global) are opaque here; the
//! store behind the context routes them.

use async_trait::async_trait;
use serde_json::Value;

use crate::arrays::TagArray;
use crate::errors::ErrorKind;
use crate::json;
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;
use crate::subtags::{
    parse_int, Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler,
    SubtagRegistry,
};

pub fn register_variable_subtags(registry: &mut SubtagRegistry) {
    registry.register(
        SubtagDef::new("get", SubtagCategory::Variables, GetSubtag)
            .signature(Signature::new(vec![Parameter::required("name")]))
            .signature(Signature::new(vec![
                Parameter::required("name"),
                Parameter::optional("index"),
            ])),
    );

    registry.register(
        SubtagDef::new("set", SubtagCategory::Variables, SetSubtag)
            .signature(Signature::new(vec![Parameter::required("name")]))
            .signature(Signature::new(vec![
                Parameter::required("name"),
                Parameter::required("value"),
            ]))
            .signature(Signature::new(vec![
                Parameter::required("name"),
                Parameter::variadic("values", 2),
            ])),
    );
}

struct GetSubtag;

#[async_trait]
impl SubtagHandler for GetSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let name = args.eval(ctx, 0).await?;
        let value = ctx
            .variables
            .get(&name)
            .await
            .map_err(|e| ctx.store_failure(e))?;
        let Some(value) = value else {
            // Unset variables read as empty, never as an error.
            return Ok(Output::None);
        };

        if args.has(1) {
            let index_text = args.eval(ctx, 1).await?;
            if !index_text.is_empty() {
                let Value::Array(items) = &value else {
                    return Err(ctx.raise(ErrorKind::NotAnArray {
                        value: json::display(&value),
                    }));
                };
                let index = parse_int(&index_text).map_err(|kind| ctx.raise(kind))?;
                let element = usize::try_from(index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .ok_or_else(|| {
                        ctx.raise(ErrorKind::IndexOutOfRange {
                            index: index.max(0) as usize,
                            length: items.len(),
                        })
                    })?;
                return Ok(Output::Text(json::display(element)));
            }
        }

        Ok(Output::Text(json::display(&value)))
    }
}

struct SetSubtag;

#[async_trait]
impl SubtagHandler for SetSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let name = args.eval(ctx, 0).await?;
        match args.len() {
            1 => ctx.variables.reset(&name),
            2 => {
                let value = args.eval(ctx, 1).await?;
                // A serialized array assigns as an array, anything else as text.
                match TagArray::parse(&value) {
                    Some(array) => ctx.variables.set(&name, Value::Array(array.values)),
                    None => ctx.variables.set(&name, Value::String(value)),
                }
            }
            _ => {
                let mut values = Vec::with_capacity(args.len() - 1);
                for index in 1..args.len() {
                    values.push(Value::String(args.eval(ctx, index).await?));
                }
                ctx.variables.set(&name, Value::Array(values));
            }
        }
        Ok(Output::None)
    }
}
