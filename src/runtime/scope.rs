//! Lexically nested execution flags.
//!
//! Block-entering subtags push a scope; reading an unset field falls through
//! to the nearest ancestor that set it, and writes only ever touch the top
//! frame, so popping a child restores the parent's view unchanged.

/// One bundle of execution flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub quiet: Option<bool>,
    pub fallback: Option<String>,
    /// Audit reason the embedding host attaches to moderation actions it
    /// performs on behalf of the running tag. No subtag reads this; hosts
    /// query it through [`ScopeStack::reason`] when acting.
    pub reason: Option<String>,
    pub no_lookup_errors: Option<bool>,
}

/// The scope stack for one invocation. The root frame always exists.
#[derive(Debug, Default)]
pub struct ScopeStack {
    root: Scope,
    frames: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(Scope::default());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top_mut(&mut self) -> &mut Scope {
        self.frames.last_mut().unwrap_or(&mut self.root)
    }

    fn lookup<T: Clone>(&self, field: impl Fn(&Scope) -> Option<T>) -> Option<T> {
        self.frames
            .iter()
            .rev()
            .chain(std::iter::once(&self.root))
            .find_map(|scope| field(scope))
    }

    pub fn quiet(&self) -> Option<bool> {
        self.lookup(|scope| scope.quiet)
    }

    pub fn set_quiet(&mut self, value: Option<bool>) {
        self.top_mut().quiet = value;
    }

    pub fn fallback(&self) -> Option<String> {
        self.lookup(|scope| scope.fallback.clone())
    }

    pub fn set_fallback(&mut self, value: Option<String>) {
        self.top_mut().fallback = value;
    }

    /// Host-facing: the audit reason in effect at the current scope. See
    /// [`Scope::reason`].
    pub fn reason(&self) -> Option<String> {
        self.lookup(|scope| scope.reason.clone())
    }

    pub fn set_reason(&mut self, value: Option<String>) {
        self.top_mut().reason = value;
    }

    pub fn no_lookup_errors(&self) -> Option<bool> {
        self.lookup(|scope| scope.no_lookup_errors)
    }

    pub fn set_no_lookup_errors(&mut self, value: Option<bool>) {
        self.top_mut().no_lookup_errors = value;
    }
}
