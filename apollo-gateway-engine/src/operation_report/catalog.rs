//! Constructors for every diagnostic the engine reports about an operation.
//!
//! Messages are stable: clients and tests match on them.

use std::fmt::Display;

use super::ExternalError;

impl ExternalError {
    pub fn field_undefined_on_type(field_name: impl Display, type_name: impl Display) -> Self {
        Self::from_message(format!("field: {field_name} not defined on type: {type_name}"))
    }

    pub fn type_undefined(type_name: impl Display) -> Self {
        Self::from_message(format!("type not defined: {type_name}"))
    }

    pub fn operation_name_must_be_unique(operation_name: impl Display) -> Self {
        Self::from_message(format!("operation name must be unique: {operation_name}"))
    }

    pub fn anonymous_operation_must_be_the_only_operation_in_document() -> Self {
        Self::from_message(
            "anonymous operation name the only operation in a graphql document".to_string(),
        )
    }

    pub fn subscription_must_only_have_one_root_selection(subscription_name: impl Display) -> Self {
        Self::from_message(format!(
            "subscription: {subscription_name} must only have one root selection"
        ))
    }

    pub fn field_selection_on_union(field_name: impl Display, union_name: impl Display) -> Self {
        Self::from_message(format!("cannot select field: {field_name} on union: {union_name}"))
    }

    pub fn fields_conflict(
        object_name: impl Display,
        left_type: impl Display,
        right_type: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "fields '{object_name}' conflict because they return conflicting types '{left_type}' and '{right_type}'"
        ))
    }

    pub fn types_for_field_mismatch(
        object_name: impl Display,
        left_type: impl Display,
        right_type: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "differing types '{left_type}' and '{right_type}' for objectName '{object_name}'"
        ))
    }

    pub fn response_of_differing_types_must_be_of_same_shape(
        left_object_name: impl Display,
        right_object_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "objects '{left_object_name}' and '{right_object_name}' on differing response types must be of same response shape"
        ))
    }

    pub fn differing_fields_on_potentially_same_type(object_name: impl Display) -> Self {
        Self::from_message(format!(
            "differing fields for objectName '{object_name}' on (potentially) same type"
        ))
    }

    pub fn field_selection_on_scalar(
        field_name: impl Display,
        scalar_type_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "cannot select field: {field_name} on scalar {scalar_type_name}"
        ))
    }

    pub fn missing_field_selection_on_non_scalar(
        field_name: impl Display,
        enclosing_type_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "non scalar field: {field_name} on type: {enclosing_type_name} must have selections"
        ))
    }

    pub fn cannot_merge_selection_set() -> Self {
        Self::from_message("cannot merge selection set".to_string())
    }

    pub fn argument_not_defined_on_node(argument_name: impl Display, node: impl Display) -> Self {
        Self::from_message(format!("argument: {argument_name} not defined on node: {node}"))
    }

    pub fn value_doesnt_satisfy_input_value_definition(
        value: impl Display,
        input_type: impl Display,
    ) -> Self {
        Self::from_message(format!("value: {value} doesn't satisfy inputType: {input_type}"))
    }

    pub fn variable_not_defined_on_operation(
        variable_name: impl Display,
        operation_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "variable: {variable_name} not defined on operation: {operation_name}"
        ))
    }

    pub fn variable_defined_but_never_used(
        variable_name: impl Display,
        operation_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "variable: {variable_name} defined on operation: {operation_name} but never used"
        ))
    }

    pub fn variable_must_be_unique(
        variable_name: impl Display,
        operation_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "variable: {variable_name} must be unique per operation: {operation_name}"
        ))
    }

    pub fn variable_not_defined_on_argument(
        variable_name: impl Display,
        argument_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "variable: {variable_name} not defined on argument: {argument_name}"
        ))
    }

    pub fn variable_of_type_is_no_valid_input_value(
        variable_name: impl Display,
        of_type_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "variable: {variable_name} of type: {of_type_name} is no valid input value type"
        ))
    }

    pub fn argument_must_be_unique(argument_name: impl Display) -> Self {
        Self::from_message(format!("argument: {argument_name} must be unique"))
    }

    pub fn argument_required_on_field(
        argument_name: impl Display,
        field_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "argument: {argument_name} is required on field: {field_name} but missing"
        ))
    }

    pub fn argument_on_field_must_not_be_null(
        argument_name: impl Display,
        field_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "argument: {argument_name} on field: {field_name} must not be null"
        ))
    }

    pub fn fragment_spread_forms_cycle(spread_name: impl Display) -> Self {
        Self::from_message(format!("fragment spread: {spread_name} forms fragment cycle"))
    }

    pub fn fragment_defined_but_not_used(fragment_name: impl Display) -> Self {
        Self::from_message(format!("fragment: {fragment_name} defined but not used"))
    }

    pub fn fragment_undefined(fragment_name: impl Display) -> Self {
        Self::from_message(format!("fragment: {fragment_name} undefined"))
    }

    pub fn inline_fragment_on_type_disallowed(on_type_name: impl Display) -> Self {
        Self::from_message(format!("inline fragment on type: {on_type_name} disallowed"))
    }

    pub fn inline_fragment_on_type_mismatch_enclosing_type(
        fragment_type_name: impl Display,
        enclosing_type_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "inline fragment on type: {fragment_type_name} mismatches enclosing type: {enclosing_type_name}"
        ))
    }

    pub fn fragment_definition_on_type_disallowed(
        fragment_name: impl Display,
        on_type_name: impl Display,
    ) -> Self {
        Self::from_message(format!("fragment: {fragment_name} on type: {on_type_name} disallowed"))
    }

    pub fn fragment_definition_must_be_unique(fragment_name: impl Display) -> Self {
        Self::from_message(format!("fragment: {fragment_name} must be unique per document"))
    }

    pub fn directive_undefined(directive_name: impl Display) -> Self {
        Self::from_message(format!("directive: {directive_name} undefined"))
    }

    pub fn directive_not_allowed_on_node(
        directive_name: impl Display,
        node_kind_name: impl Display,
    ) -> Self {
        Self::from_message(format!(
            "directive: {directive_name} not allowed on node of kind: {node_kind_name}"
        ))
    }

    pub fn directive_must_be_unique_per_location(directive_name: impl Display) -> Self {
        Self::from_message(format!("directive: {directive_name} must be unique per location"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn messages_are_stable() {
        assert_eq!(
            ExternalError::argument_required_on_field("id", "droid").message,
            "argument: id is required on field: droid but missing"
        );
        assert_eq!(
            ExternalError::inline_fragment_on_type_mismatch_enclosing_type("Human", "Droid")
                .message,
            "inline fragment on type: Human mismatches enclosing type: Droid"
        );
        assert_eq!(
            ExternalError::fields_conflict("name", "String", "Int").message,
            "fields 'name' conflict because they return conflicting types 'String' and 'Int'"
        );
        assert_eq!(
            ExternalError::cannot_merge_selection_set().message,
            "cannot merge selection set"
        );
    }
}
