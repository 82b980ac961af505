//! Deferred output state and external event waits.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::ErrorKind;
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;
use crate::subtags::{
    parse_int, Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler,
    SubtagRegistry,
};

/// Default and maximum `{waitreaction}` timeouts, in seconds.
const DEFAULT_WAIT_SECS: i64 = 60;
const MAX_WAIT_SECS: i64 = 300;

pub fn register_message_subtags(registry: &mut SubtagRegistry) {
    registry.register(
        SubtagDef::new("output", SubtagCategory::Message, OutputSubtag)
            .signature(Signature::new(vec![Parameter::optional("text")])),
    );

    registry.register(
        SubtagDef::new("replace", SubtagCategory::Message, ReplaceSubtag)
            .signature(Signature::new(vec![
                Parameter::required("phrase"),
                Parameter::required("replacewith"),
            ]))
            .signature(Signature::new(vec![
                Parameter::required("text"),
                Parameter::required("phrase"),
                Parameter::required("replacewith"),
            ])),
    );

    registry.register(
        SubtagDef::new("waitreaction", SubtagCategory::Message, WaitReactionSubtag)
            .aliases(&["waitreact"])
            .signature(Signature::new(vec![
                Parameter::required("messageid"),
                Parameter::optional("userid"),
                Parameter::optional_or("timeout", "60"),
            ])),
    );
}

struct OutputSubtag;

#[async_trait]
impl SubtagHandler for OutputSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        if ctx.output.output_override.is_some() {
            return Err(ctx.raise(ErrorKind::OutputAlreadySet));
        }
        let text = args.eval(ctx, 0).await?;
        ctx.output.output_override = Some(text);
        Ok(Output::None)
    }
}

struct ReplaceSubtag;

#[async_trait]
impl SubtagHandler for ReplaceSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        if args.len() == 2 {
            // Deferred: applied once to the final output.
            let phrase = args.eval(ctx, 0).await?;
            let replacement = args.eval(ctx, 1).await?;
            ctx.output.replace = Some((phrase, replacement));
            Ok(Output::None)
        } else {
            let text = args.eval(ctx, 0).await?;
            let phrase = args.eval(ctx, 1).await?;
            let replacement = args.eval(ctx, 2).await?;
            Ok(Output::Text(text.replacen(&phrase, &replacement, 1)))
        }
    }
}

struct WaitReactionSubtag;

#[async_trait]
impl SubtagHandler for WaitReactionSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        if let Err(rule) = ctx.limits.check("waitreaction", 1) {
            return Err(ctx.abort(ErrorKind::LimitExceeded { rule }));
        }

        let message_id = args.eval(ctx, 0).await?;
        let user_id = args.eval(ctx, 1).await?;
        let timeout_text = args.eval_or(ctx, 2, "60").await?;
        let timeout_secs = parse_int(&timeout_text)
            .map_err(|kind| ctx.raise(kind))?
            .clamp(0, MAX_WAIT_SECS);
        let timeout_secs = if timeout_secs == 0 {
            DEFAULT_WAIT_SECS
        } else {
            timeout_secs
        };
        let timeout = Duration::from_secs(timeout_secs as u64);

        let pool = ctx.reactions.clone();
        let wanted_message = message_id.clone();
        let wanted_user = user_id.clone();
        let event = pool
            .wait(
                vec![message_id.clone()],
                Box::new(move |event| {
                    event.message_id == wanted_message
                        && (wanted_user.is_empty() || event.user_id == wanted_user)
                }),
                timeout,
            )
            .await;

        match event {
            Some(reaction) => Ok(Output::Array(vec![
                Value::String(reaction.message_id),
                Value::String(reaction.user_id),
                Value::String(reaction.emote),
            ])),
            None => Err(ctx.raise(ErrorKind::WaitTimedOut {
                millis: timeout.as_millis() as u64,
            })),
        }
    }
}
