//! Scope stack for one translation call.
//!
//! The walker opens a [`Builder`] for every composite node it enters and
//! closes it when the host node is done. Closing finishes the builder and
//! applies the node to the scope below it; closing the last scope captures
//! the root. The context also owns the name counters and the query parameter
//! side table, so two translations never share state.

use crate::config::TranslatorConfig;
use crate::error::{ProtocolError, TranslateResult};
use crate::ir::builder::Builder;
use crate::ir::{Expr, Parameter};
use crate::params::{Extractor, ParameterMap};
use crate::transform::ConstantFolding;
use crate::types::TypeRef;
use tracing::trace;

/// Row symbol name for the `n`-th minted row: `a`..`z`, `aa`, `ab`, ...
pub(crate) fn row_name(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(char::from(b'a' + (n % 26) as u8));
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn unbalanced(message: impl Into<String>) -> ProtocolError {
    ProtocolError::UnbalancedScope(message.into())
}

pub(crate) struct TranslationContext<'c> {
    config: &'c TranslatorConfig,
    stack: Vec<Builder>,
    root: Option<Expr>,
    next_row: usize,
    next_param: usize,
    params: ParameterMap,
}

impl<'c> TranslationContext<'c> {
    pub fn new(config: &'c TranslatorConfig) -> Self {
        Self {
            config,
            stack: Vec::new(),
            root: None,
            next_row: 0,
            next_param: 0,
            params: ParameterMap::new(),
        }
    }

    pub fn config(&self) -> &'c TranslatorConfig {
        self.config
    }

    pub fn top(&self) -> Option<&Builder> {
        self.stack.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Builder> {
        self.stack.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn open(&mut self, builder: Builder) {
        trace!(kind = %builder.kind(), depth = self.stack.len(), "open scope");
        self.stack.push(builder);
    }

    /// Open `builder` unless `reuse` holds for the current top.
    ///
    /// Returns whether a scope was opened; only then must the caller close it.
    pub fn open_unless(
        &mut self,
        reuse: impl FnOnce(&mut Builder) -> bool,
        builder: impl FnOnce() -> Builder,
    ) -> bool {
        if let Some(top) = self.stack.last_mut() {
            if reuse(top) {
                trace!(kind = %top.kind(), "reuse open scope");
                return false;
            }
        }
        self.open(builder());
        true
    }

    /// Finish the top scope and apply it to the scope below
    pub fn close(&mut self) -> TranslateResult<()> {
        let builder = self
            .stack
            .pop()
            .ok_or_else(|| unbalanced("close without an open scope"))?;
        let mut expr = builder.finish()?;
        if self.config.fold_constants {
            expr = ConstantFolding::fold_node(expr);
        }
        trace!(kind = %expr.kind(), depth = self.stack.len(), "close scope");
        self.emit(expr)
    }

    /// Apply a finished node to the top scope, or capture it as the root
    pub fn emit(&mut self, expr: Expr) -> TranslateResult<()> {
        match self.stack.pop() {
            Some(parent) => {
                trace!(parent = %parent.kind(), child = %expr.kind(), "apply");
                let parent = parent.apply(expr)?;
                self.stack.push(parent);
                Ok(())
            }
            None if self.root.is_some() => Err(unbalanced("a root was already captured").into()),
            None => {
                self.root = Some(expr);
                Ok(())
            }
        }
    }

    /// Set the open scopes aside so a sub-tree can be translated on its own
    pub fn suspend(&mut self) -> Vec<Builder> {
        std::mem::take(&mut self.stack)
    }

    /// Restore scopes set aside by [`suspend`](Self::suspend)
    pub fn resume(&mut self, stack: Vec<Builder>) {
        self.stack = stack;
    }

    /// Take the captured root of a balanced walk
    pub fn take_root(&mut self) -> TranslateResult<Expr> {
        if !self.stack.is_empty() {
            return Err(unbalanced(format!("{} scope(s) left open", self.stack.len())).into());
        }
        self.root
            .take()
            .ok_or_else(|| unbalanced("nothing was translated").into())
    }

    pub fn mint_row(&mut self, ty: TypeRef) -> Parameter {
        let row = Parameter::new(row_name(self.next_row), ty);
        self.next_row += 1;
        trace!(name = %row.name, ty = %row.ty, "mint row symbol");
        row
    }

    /// The row symbol for rows of `ty` in the current scope.
    ///
    /// Open scopes are searched from the innermost outwards; when none
    /// exposes a row of this type a symbol is minted and handed to the top
    /// scope, which aliases its source with it.
    pub fn resolve_row(&mut self, ty: &TypeRef) -> Parameter {
        let existing = self
            .stack
            .iter()
            .rev()
            .flat_map(Builder::visible_rows)
            .find(|row| &row.ty == ty)
            .cloned();
        if let Some(row) = existing {
            return row;
        }
        let row = self.mint_row(ty.clone());
        if let Some(top) = self.stack.last_mut() {
            top.set_row(row.clone());
        }
        row
    }

    /// Row symbols of both sides of the open join
    pub fn join_side_rows(&mut self) -> TranslateResult<(Parameter, Parameter)> {
        let Self {
            stack, next_row, ..
        } = self;
        let Some(Builder::Join(join)) = stack.last_mut() else {
            return Err(unbalanced("no open join").into());
        };
        join.bind_sides(&mut |ty: TypeRef| {
            let row = Parameter::new(row_name(*next_row), ty);
            *next_row += 1;
            trace!(name = %row.name, ty = %row.ty, "mint join side symbol");
            row
        })
    }

    /// A fresh query parameter recovered by `extractor` at bind time
    pub fn query_parameter(&mut self, ty: TypeRef, extractor: Option<Extractor>) -> Expr {
        let name = format!("{}{}", self.config.parameter_prefix, self.next_param);
        self.next_param += 1;
        trace!(%name, %ty, "mint query parameter");
        self.params.insert(name.clone(), ty.clone(), extractor);
        Expr::query_parameter(name, ty)
    }

    /// The root and the parameter table of a completed walk
    pub fn finish(mut self) -> TranslateResult<(Expr, ParameterMap)> {
        let root = self.take_root()?;
        Ok((root, self.params))
    }
}
