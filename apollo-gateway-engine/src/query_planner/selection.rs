//! Flattens selection sets into the fields of one response object.
//!
//! Fragment spreads and inline fragments are inlined, literal `@skip` and
//! `@include` are applied and fields sharing a response key are grouped.

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::ast::DirectiveList;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::operation_report::ExternalError;
use crate::operation_report::Path;
use crate::operation_report::Report;
use crate::resolve::Condition;

/// Every selection of one response key.
#[derive(Debug)]
pub(crate) struct CollectedField<'a> {
    pub(crate) fields: Vec<&'a Node<Field>>,
    pub(crate) conditions: Vec<Condition>,
}

impl<'a> CollectedField<'a> {
    pub(crate) fn first(&self) -> &'a Node<Field> {
        self.fields[0]
    }

    pub(crate) fn selection_sets(&self) -> Vec<&'a SelectionSet> {
        self.fields.iter().map(|field| &field.selection_set).collect()
    }
}

pub(crate) struct FieldCollector<'a, 'r> {
    document: &'a ExecutableDocument,
    report: &'r mut Report,
}

impl<'a, 'r> FieldCollector<'a, 'r> {
    pub(crate) fn new(document: &'a ExecutableDocument, report: &'r mut Report) -> Self {
        FieldCollector { document, report }
    }

    /// Collects the fields of `selection_sets`, in selection order, keyed by
    /// response key.
    pub(crate) fn collect(
        mut self,
        selection_sets: &[&'a SelectionSet],
        path: &Path,
    ) -> IndexMap<String, CollectedField<'a>> {
        let mut fields = IndexMap::new();
        for selection_set in selection_sets {
            self.collect_selection_set(selection_set, &[], &mut Vec::new(), path, &mut fields);
        }
        fields
    }

    fn collect_selection_set(
        &mut self,
        selection_set: &'a SelectionSet,
        inherited: &[Condition],
        spreads: &mut Vec<&'a str>,
        path: &Path,
        fields: &mut IndexMap<String, CollectedField<'a>>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    let Some(conditions) = self.conditions(&field.directives, inherited, path)
                    else {
                        continue;
                    };
                    match fields.entry(field.response_key().to_string()) {
                        Entry::Occupied(mut entry) => {
                            let collected = entry.get_mut();
                            collected.fields.push(field);
                            if collected.conditions != conditions {
                                // selected at least once under different conditions: always include
                                collected.conditions.clear();
                            }
                        }
                        Entry::Vacant(entry) => {
                            entry.insert(CollectedField {
                                fields: vec![field],
                                conditions,
                            });
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let Some(conditions) = self.conditions(&spread.directives, inherited, path)
                    else {
                        continue;
                    };
                    let name = spread.fragment_name.as_str();
                    if spreads.contains(&name) {
                        self.report.add_external_error(
                            ExternalError::fragment_spread_forms_cycle(name)
                                .with_path(path.clone()),
                        );
                        continue;
                    }
                    let Some(fragment) = self.document.fragments.get(&spread.fragment_name) else {
                        self.report.add_external_error(
                            ExternalError::fragment_undefined(name).with_path(path.clone()),
                        );
                        continue;
                    };
                    if fragment.selection_set.ty != selection_set.ty {
                        self.report.add_external_error(
                            ExternalError::fragment_definition_on_type_disallowed(
                                name,
                                &fragment.selection_set.ty,
                            )
                            .with_path(path.clone()),
                        );
                        continue;
                    }
                    spreads.push(name);
                    self.collect_selection_set(
                        &fragment.selection_set,
                        &conditions,
                        spreads,
                        path,
                        fields,
                    );
                    spreads.pop();
                }
                Selection::InlineFragment(inline) => {
                    let Some(conditions) = self.conditions(&inline.directives, inherited, path)
                    else {
                        continue;
                    };
                    if let Some(type_condition) = &inline.type_condition {
                        if *type_condition != selection_set.ty {
                            self.report.add_external_error(
                                ExternalError::inline_fragment_on_type_mismatch_enclosing_type(
                                    type_condition,
                                    &selection_set.ty,
                                )
                                .with_path(path.clone()),
                            );
                            continue;
                        }
                    }
                    self.collect_selection_set(
                        &inline.selection_set,
                        &conditions,
                        spreads,
                        path,
                        fields,
                    );
                }
            }
        }
    }

    /// Evaluates `@skip` and `@include`. Returns `None` when the selection is
    /// excluded whatever the variables, otherwise the conditions left for the
    /// resolver, `inherited` first.
    fn conditions(
        &mut self,
        directives: &DirectiveList,
        inherited: &[Condition],
        path: &Path,
    ) -> Option<Vec<Condition>> {
        let mut conditions = inherited.to_vec();
        for (directive_name, excluded_when) in [("skip", true), ("include", false)] {
            let Some(directive) = directives.get(directive_name) else {
                continue;
            };
            match directive.specified_argument_by_name("if").map(|value| &**value) {
                Some(ast::Value::Boolean(value)) => {
                    if *value == excluded_when {
                        return None;
                    }
                }
                Some(ast::Value::Variable(variable)) => {
                    let variable = variable.to_string();
                    conditions.push(if excluded_when {
                        Condition::Skip(variable)
                    } else {
                        Condition::Include(variable)
                    });
                }
                other => {
                    let value = other.map(|value| value.to_string());
                    self.report.add_external_error(
                        ExternalError::value_doesnt_satisfy_input_value_definition(
                            value.as_deref().unwrap_or("null"),
                            "Boolean!",
                        )
                        .with_path(path.clone()),
                    );
                }
            }
        }
        Some(conditions)
    }
}
