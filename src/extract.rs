//! Call-site discovery shared by the scanner and the transformer.
//!
//! Both sides must agree exactly on which calls are style declarations, so
//! there is one walker. A call matches when the source text of its callee
//! equals the configured callee name. Matching calls are not descended into.

use std::ops::Range;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPatternKind, CallExpression, Declaration, IdentifierReference, ImportDeclaration,
    ImportDeclarationSpecifier, Statement, VariableDeclaration, VariableDeclarationKind,
};
use oxc_ast::visit::walk;
use oxc_ast::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};

use crate::eval::{self, evaluate_with, EvalOptions, Scope};
use crate::style::StyleDeclaration;
use crate::{FlowError, DEFAULT_CALLEE, DEFAULT_IMPORT_SOURCE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub callee: String,
    pub import_source: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            callee: DEFAULT_CALLEE.to_string(),
            import_source: DEFAULT_IMPORT_SOURCE.to_string(),
        }
    }
}

/// One `css(...)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Byte range of the whole call expression.
    pub span: Range<usize>,
    /// Source text of the first argument.
    pub argument: Option<String>,
    /// Source text of the whole call.
    pub text: String,
}

/// An import of the callee from the configured source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    pub declaration: Range<usize>,
    pub specifier: Range<usize>,
    /// Total specifiers in the declaration.
    pub specifier_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleStyles {
    /// Matching calls in source order.
    pub calls: Vec<CallSite>,
    /// Top-level `const` bindings that lower into the evaluation grammar.
    pub scope: Scope,
    pub imports: Vec<ImportSite>,
    /// References to the callee name outside matched call sites.
    pub other_references: usize,
}

impl ModuleStyles {
    /// Evaluate one call site of this module.
    pub fn evaluate(
        &self,
        call: &CallSite,
        file: &str,
        options: &EvalOptions,
    ) -> Result<StyleDeclaration, FlowError> {
        let Some(argument) = &call.argument else {
            return Err(FlowError::Extraction {
                file: file.to_string(),
                reason: format!("`{}` has no style argument", call.text),
                source: None,
            });
        };
        evaluate_with(argument, &self.scope, options).map_err(|err| FlowError::Extraction {
            file: file.to_string(),
            reason: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

/// Parse `code` and collect its style call sites.
pub fn extract(code: &str, file: &str, options: &ExtractOptions) -> Result<ModuleStyles, FlowError> {
    let path = file.split_once('?').map_or(file, |(path, _)| path);
    let source_type = SourceType::from_path(Path::new(path))
        .unwrap_or_else(|_| eval::expression_source_type());

    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let reason = ret
            .errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "parser gave up".to_string());
        return Err(FlowError::Extraction {
            file: file.to_string(),
            reason,
            source: None,
        });
    }

    let mut collector = Collector {
        source: code,
        options,
        styles: ModuleStyles::default(),
    };
    for statement in &ret.program.body {
        match statement {
            Statement::VariableDeclaration(decl) => collector.record_constants(decl),
            Statement::ExportNamedDeclaration(export) => {
                if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
                    collector.record_constants(decl);
                }
            }
            _ => {}
        }
    }
    collector.visit_program(&ret.program);
    Ok(collector.styles)
}

struct Collector<'s> {
    source: &'s str,
    options: &'s ExtractOptions,
    styles: ModuleStyles,
}

impl<'s> Collector<'s> {
    fn text(&self, span: oxc_span::Span) -> &'s str {
        span.source_text(self.source)
    }

    fn record_constants(&mut self, decl: &VariableDeclaration<'_>) {
        if decl.kind != VariableDeclarationKind::Const {
            return;
        }
        for declarator in &decl.declarations {
            let BindingPatternKind::BindingIdentifier(id) = &declarator.id.kind else {
                continue;
            };
            let Some(init) = &declarator.init else {
                continue;
            };
            // Unsupported initializers only matter if a style actually uses them.
            if let Ok(expr) = eval::lower(init) {
                self.styles.scope.insert(id.name.to_string(), expr);
            }
        }
    }
}

impl<'a> Visit<'a> for Collector<'_> {
    fn visit_call_expression(&mut self, it: &CallExpression<'a>) {
        if self.text(it.callee.span()) != self.options.callee {
            walk::walk_call_expression(self, it);
            return;
        }
        let argument = it
            .arguments
            .first()
            .map(|arg| self.text(arg.span()).to_string());
        let text = self.text(it.span).to_string();
        self.styles.calls.push(CallSite {
            span: it.span.start as usize..it.span.end as usize,
            argument,
            text,
        });
    }

    fn visit_import_declaration(&mut self, it: &ImportDeclaration<'a>) {
        if !it.source.value.as_str().contains(self.options.import_source.as_str()) {
            return;
        }
        let Some(specifiers) = &it.specifiers else {
            return;
        };
        for specifier in specifiers {
            let ImportDeclarationSpecifier::ImportSpecifier(named) = specifier else {
                continue;
            };
            if named.local.name.as_str() == self.options.callee {
                self.styles.imports.push(ImportSite {
                    declaration: it.span.start as usize..it.span.end as usize,
                    specifier: named.span.start as usize..named.span.end as usize,
                    specifier_count: specifiers.len(),
                });
            }
        }
    }

    fn visit_identifier_reference(&mut self, it: &IdentifierReference<'a>) {
        if it.name.as_str() == self.options.callee {
            self.styles.other_references += 1;
        }
    }
}
