//! Platform entity lookups.
//!
//! All three lookups share one shape: resolve a textual query through the
//! platform collaborator, honoring quiet mode from either an explicit
//! argument or the surrounding scope. Quiet lookups that miss produce the
//! scope fallback (or nothing) instead of an error.

use async_trait::async_trait;

use crate::errors::ErrorKind;
use crate::runtime::arguments::Arguments;
use crate::runtime::context::TagContext;
use crate::runtime::external::Entity;
use crate::runtime::Interrupt;
use crate::subtags::{
    Output, Parameter, Signature, SubtagCategory, SubtagDef, SubtagHandler, SubtagRegistry,
};

#[derive(Clone, Copy)]
enum LookupKind {
    Channel,
    User,
    Role,
}

pub fn register_platform_subtags(registry: &mut SubtagRegistry) {
    for (name, kind) in [
        ("channelid", LookupKind::Channel),
        ("userid", LookupKind::User),
        ("roleid", LookupKind::Role),
    ] {
        registry.register(
            SubtagDef::new(name, SubtagCategory::Platform, LookupSubtag { kind }).signature(
                Signature::new(vec![
                    Parameter::required("query"),
                    Parameter::optional("quiet"),
                ]),
            ),
        );
    }
}

struct LookupSubtag {
    kind: LookupKind,
}

impl LookupSubtag {
    async fn find(&self, ctx: &TagContext, query: &str) -> Option<Entity> {
        match self.kind {
            LookupKind::Channel => ctx.platform.find_channel(query).await,
            LookupKind::User => ctx.platform.find_user(query).await,
            LookupKind::Role => ctx.platform.find_role(query).await,
        }
    }

    fn not_found(&self, query: String) -> ErrorKind {
        match self.kind {
            LookupKind::Channel => ErrorKind::ChannelNotFound { query },
            LookupKind::User => ErrorKind::UserNotFound { query },
            LookupKind::Role => ErrorKind::RoleNotFound { query },
        }
    }
}

#[async_trait]
impl SubtagHandler for LookupSubtag {
    async fn invoke(
        &self,
        ctx: &mut TagContext,
        args: &mut Arguments<'_>,
    ) -> Result<Output, Interrupt> {
        let query = args.eval(ctx, 0).await?;
        let quiet_arg = args.eval(ctx, 1).await?;
        let quiet = !quiet_arg.is_empty()
            || ctx.scopes.quiet().unwrap_or(false)
            || ctx.scopes.no_lookup_errors().unwrap_or(false);

        match self.find(ctx, &query).await {
            Some(entity) => Ok(Output::Text(entity.id)),
            None if quiet => Ok(match ctx.scopes.fallback() {
                Some(fallback) => Output::Text(fallback),
                None => Output::None,
            }),
            None => Err(ctx.raise(self.not_found(query))),
        }
    }
}
