use std::collections::HashSet;

use proc_macro2::Span;
use syn::visit::{self, Visit};
use syn::{Block, Expr, ExprAwait, ExprCall, ExprMethodCall, ExprPath, ImplItemFn, ItemFn, Member, Pat, Stmt};

use crate::{Finding, FindingKind, LintConfig};

const QUERY_METHODS: [&str; 6] = [
    "fetch",
    "fetch_one",
    "fetch_optional",
    "fetch_all",
    "fetch_many",
    "execute",
];

const READ_PREFIXES: [&str; 6] = ["get_", "list_", "find_", "load_", "count_", "read_"];

const READ_SUFFIXES: [&str; 2] = ["_exists", "_rows"];

fn is_read_method(name: &str, config: &LintConfig) -> bool {
    READ_PREFIXES.iter().any(|p| name.starts_with(p))
        || READ_SUFFIXES.iter().any(|s| name.ends_with(s))
        || name == "exists"
        || name.starts_with("workspace_of_")
        || config.read_methods.iter().any(|m| m == name)
}

fn line_of(span: Span) -> usize {
    span.start().line
}

fn pat_name(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(p) => Some(p.ident.to_string()),
        Pat::Type(t) => pat_name(&t.pat),
        _ => None,
    }
}

/// Last name in a receiver chain: `self.pool.writer` and `writer()` both
/// end in `writer`.
fn receiver_tail(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Field(f) => match &f.member {
            Member::Named(ident) => Some(ident.to_string()),
            Member::Unnamed(_) => None,
        },
        Expr::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        Expr::MethodCall(m) => Some(m.method.to_string()),
        Expr::Reference(r) => receiver_tail(&r.expr),
        Expr::Paren(p) => receiver_tail(&p.expr),
        _ => None,
    }
}

/// Single-segment paths an expression mentions.
#[derive(Default)]
struct Mentions {
    names: HashSet<String>,
}

impl<'ast> Visit<'ast> for Mentions {
    fn visit_expr_path(&mut self, path: &'ast ExprPath) {
        if let Some(ident) = path.path.get_ident() {
            self.names.insert(ident.to_string());
        }
        visit::visit_expr_path(self, path);
    }
}

fn mentions(expr: &Expr) -> HashSet<String> {
    let mut m = Mentions::default();
    m.visit_expr(expr);
    m.names
}

/// Finds `<writer>.begin()` anywhere in an initializer, so
/// `self.pool.writer.begin().await.map_err(..)?` counts.
struct FindBegin<'a> {
    writers: &'a [String],
    found: bool,
}

impl<'ast> Visit<'ast> for FindBegin<'_> {
    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        if call.method == "begin"
            && receiver_tail(&call.receiver).is_some_and(|tail| self.writers.contains(&tail))
        {
            self.found = true;
        }
        visit::visit_expr_method_call(self, call);
    }
}

fn path_ident(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Path(p) => p.path.get_ident().map(|i| i.to_string()),
        _ => None,
    }
}

/// Transactions a statement commits, rolls back or moves away
/// (`commit(tx, tracker, bus)`, `self.finish(tx, ..)`).
#[derive(Default)]
struct FindClose {
    closed: Vec<String>,
}

impl FindClose {
    fn consume<'e>(&mut self, args: impl IntoIterator<Item = &'e Expr>) {
        self.closed.extend(args.into_iter().filter_map(path_ident));
    }
}

impl<'ast> Visit<'ast> for FindClose {
    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        if call.method == "commit" || call.method == "rollback" {
            self.closed.extend(path_ident(&call.receiver));
        }
        self.consume(&call.args);
        visit::visit_expr_method_call(self, call);
    }

    fn visit_expr_call(&mut self, call: &'ast ExprCall) {
        self.consume(&call.args);
        visit::visit_expr_call(self, call);
    }
}

struct OpenTx {
    name: String,
    line: usize,
}

pub(crate) struct TxReadVisitor<'a> {
    file: &'a str,
    config: &'a LintConfig,
    function: Option<String>,
    open: Vec<OpenTx>,
    /// Locals derived from an open transaction (`let q = repo.tx(&mut tx)`).
    bound: HashSet<String>,
    findings: Vec<Finding>,
}

impl<'a> TxReadVisitor<'a> {
    pub(crate) fn new(file: &'a str, config: &'a LintConfig) -> Self {
        Self {
            file,
            config,
            function: None,
            open: Vec::new(),
            bound: HashSet::new(),
            findings: Vec::new(),
        }
    }

    pub(crate) fn into_findings(mut self) -> Vec<Finding> {
        self.findings.sort_by_key(|f| (f.line, f.column));
        self.findings
    }

    /// Nested functions get a fresh transaction state.
    fn in_function(&mut self, name: String, walk: impl FnOnce(&mut Self)) {
        let function = self.function.replace(name);
        let open = std::mem::take(&mut self.open);
        let bound = std::mem::take(&mut self.bound);
        walk(self);
        self.function = function;
        self.open = open;
        self.bound = bound;
    }

    fn begins_write(&self, expr: &Expr) -> bool {
        let mut finder = FindBegin {
            writers: &self.config.writer_names,
            found: false,
        };
        finder.visit_expr(expr);
        finder.found
    }

    /// Whether `expr` goes through an open transaction or a local bound
    /// to one.
    fn is_bound(&self, expr: &Expr) -> bool {
        let names = mentions(expr);
        self.open.iter().any(|tx| names.contains(&tx.name)) || names.iter().any(|n| self.bound.contains(n))
    }

    fn close(&mut self, expr: &Expr) {
        let mut finder = FindClose::default();
        finder.visit_expr(expr);
        if !finder.closed.is_empty() {
            self.open.retain(|tx| !finder.closed.contains(&tx.name));
        }
    }

    /// Update transaction state after `stmt` has been checked.
    fn track(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Local(local) => {
                let Some(init) = &local.init else { return };
                self.close(&init.expr);
                let Some(name) = pat_name(&local.pat) else { return };
                if self.begins_write(&init.expr) {
                    self.open.push(OpenTx {
                        name,
                        line: line_of(local.let_token.span),
                    });
                } else if !self.open.is_empty() && self.is_bound(&init.expr) {
                    self.bound.insert(name);
                }
            }
            Stmt::Expr(expr, _) => self.close(expr),
            _ => {}
        }
    }

    fn report(&mut self, span: Span, kind: FindingKind) {
        let Some(tx) = self.open.last() else { return };
        let start = span.start();
        self.findings.push(Finding {
            file: self.file.to_string(),
            line: start.line,
            column: start.column + 1,
            function: self.function.clone().unwrap_or_default(),
            transaction: tx.name.clone(),
            opened_at: tx.line,
            kind,
        });
    }
}

impl<'ast> Visit<'ast> for TxReadVisitor<'_> {
    fn visit_item_fn(&mut self, item: &'ast ItemFn) {
        self.in_function(item.sig.ident.to_string(), |v| visit::visit_item_fn(v, item));
    }

    fn visit_impl_item_fn(&mut self, item: &'ast ImplItemFn) {
        self.in_function(item.sig.ident.to_string(), |v| visit::visit_impl_item_fn(v, item));
    }

    fn visit_block(&mut self, block: &'ast Block) {
        let depth = self.open.len();
        for stmt in &block.stmts {
            self.visit_stmt(stmt);
            self.track(stmt);
        }
        self.open.truncate(depth.min(self.open.len()));
    }

    fn visit_expr_await(&mut self, awaited: &'ast ExprAwait) {
        if !self.open.is_empty() {
            if let Expr::MethodCall(call) = &*awaited.base {
                let method = call.method.to_string();
                let passes_tx = call.args.iter().any(|arg| self.is_bound(arg));
                if is_read_method(&method, self.config) && !passes_tx && !self.is_bound(&call.receiver) {
                    self.report(call.method.span(), FindingKind::UnboundRead { method });
                }
            }
        }
        visit::visit_expr_await(self, awaited);
    }

    fn visit_expr_method_call(&mut self, call: &'ast ExprMethodCall) {
        if !self.open.is_empty() && call.args.len() == 1 {
            let method = call.method.to_string();
            if QUERY_METHODS.contains(&method.as_str()) && !self.is_bound(&call.args[0]) {
                self.report(call.method.span(), FindingKind::PoolQuery { method });
            }
        }
        visit::visit_expr_method_call(self, call);
    }
}
