//! Planned state computation for managed resources

use super::schema::Schema;
use super::value::Value;

/// Compute the planned new state from the host's proposal.
///
/// The proposal already carries prior values for computed attributes the
/// configuration leaves null. When the resource is being created, or anything
/// about it changes, those attributes are marked unknown so the apply can
/// report fresh values from the daemon.
pub fn plan_resource_change(
    schema: &Schema,
    prior: &Value,
    proposed: &Value,
    config: &Value,
) -> Value {
    if proposed.is_null() {
        return Value::Null;
    }

    let mut planned = schema.conform(proposed);
    let prior = schema.conform(prior);
    if !prior.is_null() && planned == prior {
        return planned;
    }

    for (name, attr) in &schema.attributes {
        if attr.computed && config.get(name).is_null() {
            planned.set(name.clone(), Value::Unknown);
        }
    }
    planned
}
