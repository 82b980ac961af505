//! Regex subtags.
//!
//! The pattern parameter is read raw, never evaluated: a regex body must not
//! be able to execute nested calls, and its braces and semicolons belong to
//! the pattern.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::errors::ErrorKind;
use crate::regexes::{create_safe_regex, RegexRejection};
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::Interrupt;
use crate::subtags::{
    Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler, SubtagRegistry,
};

pub fn register_regex_subtags(registry: &mut SubtagRegistry) {
    registry.register(
        SubtagDef::new("regextest", SubtagCategory::Regex, RegexTestSubtag).signature(
            Signature::new(vec![
                Parameter::required("text"),
                Parameter::raw("regex", 1),
            ]),
        ),
    );

    registry.register(
        SubtagDef::new("regexmatch", SubtagCategory::Regex, RegexMatchSubtag).signature(
            Signature::new(vec![
                Parameter::required("text"),
                Parameter::raw("regex", 1),
            ]),
        ),
    );

    registry.register(
        SubtagDef::new("regexsplit", SubtagCategory::Regex, RegexSplitSubtag).signature(
            Signature::new(vec![
                Parameter::required("text"),
                Parameter::raw("regex", 1),
            ]),
        ),
    );
}

fn pattern_for(ctx: &TagContext, args: &Arguments<'_>) -> Result<Regex, Interrupt> {
    let pattern = args.raw_from(1);
    create_safe_regex(&pattern).map_err(|rejection| {
        ctx.raise(match rejection {
            RegexRejection::TooLong { length } => ErrorKind::RegexTooLong { length },
            RegexRejection::Vulnerable { reason } => ErrorKind::UnsafeRegex { reason },
            RegexRejection::Invalid { message } => ErrorKind::InvalidRegex { message },
        })
    })
}

struct RegexTestSubtag;

#[async_trait]
impl SubtagHandler for RegexTestSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let text = args.eval(ctx, 0).await?;
        let regex = pattern_for(ctx, args)?;
        Ok(Output::text(regex.is_match(&text).to_string()))
    }
}

struct RegexMatchSubtag;

#[async_trait]
impl SubtagHandler for RegexMatchSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let text = args.eval(ctx, 0).await?;
        let regex = pattern_for(ctx, args)?;
        let matches = regex
            .find_iter(&text)
            .map(|m| Value::String(m.as_str().to_string()))
            .collect();
        Ok(Output::Array(matches))
    }
}

struct RegexSplitSubtag;

#[async_trait]
impl SubtagHandler for RegexSplitSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let text = args.eval(ctx, 0).await?;
        let regex = pattern_for(ctx, args)?;
        let parts = regex
            .split(&text)
            .map(|part| Value::String(part.to_string()))
            .collect();
        Ok(Output::Array(parts))
    }
}
