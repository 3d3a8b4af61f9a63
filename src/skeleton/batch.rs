//! Batch evaluation of deferred producers

use std::sync::Arc;

use crate::render::context::Context;
use crate::render::value::Map;
use crate::skeleton::{Producer, Recipients, Skeleton, SkeletonError, VariableTable};

/// Number of recipients, checking every array has the same length
pub(crate) fn recipient_count(recipients: &Recipients) -> Result<usize, SkeletonError> {
    let mut arrays = recipients.iter();
    let (_, first) = arrays.next().ok_or(SkeletonError::EmptyRecipients)?;
    let expected = first.len();

    for (name, values) in arrays {
        if values.len() != expected {
            return Err(SkeletonError::LengthMismatch {
                name: name.clone(),
                expected,
                found: values.len(),
            });
        }
    }

    if expected == 0 {
        return Err(SkeletonError::EmptyRecipients);
    }
    Ok(expected)
}

/// Evaluate every producer once per recipient.
///
/// Recipient `i` sees `base` with the `i`-th entry of every recipient array
/// layered on top. Conditional producers evaluate their predicates against
/// that context, never a value cached at extraction time. Output columns are
/// index-aligned to recipient order.
///
/// A rendered variable containing the key prefix is rejected, since
/// reconstruction would treat it as a placeholder.
pub fn render_variables(
    skeleton: &Skeleton,
    base: &Context,
    recipients: &Recipients,
) -> Result<VariableTable, SkeletonError> {
    let variables = &skeleton.variables;
    let prefix = skeleton.key_format().prefix.as_str();
    let count = recipient_count(recipients)?;
    let mut columns: Vec<Vec<String>> = vec![Vec::with_capacity(count); variables.len()];

    for index in 0..count {
        let layer: Map = recipients
            .iter()
            .map(|(name, values)| (name.clone(), values[index].clone()))
            .collect();

        let mut ctx = base.clone();
        ctx.push_layer(Arc::new(layer));

        for ((_, producer), column) in variables.iter().zip(columns.iter_mut()) {
            let value = match producer.render(&ctx) {
                Ok(value) => value,
                Err(err) => ctx
                    .handle_error(err)
                    .map_err(|source| SkeletonError::Render { index, source })?,
            };
            if matches!(producer, Producer::Direct(_)) && value.contains(prefix) {
                return Err(SkeletonError::ReservedText { fragment: value });
            }
            column.push(value);
        }
    }

    tracing::debug!(
        recipients = count,
        producers = variables.len(),
        "evaluated skeleton variables"
    );

    Ok(variables
        .keys()
        .map(|key| key.to_string())
        .zip(columns)
        .collect())
}
