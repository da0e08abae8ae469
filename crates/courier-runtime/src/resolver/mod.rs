//! # Resource Descriptor Resolver
//!
//! Turns a [`RequestDescriptor`] into the concrete configuration of the
//! resource being requested. Pure functions, no broker access.
//!
//! ## Destination Name Precedence
//!
//! 1. Exactly one positional argument: it must be a string and is used
//!    verbatim, overriding any declared topic.
//! 2. Otherwise the topic annotation reachable from the qualifier.
//! 3. Otherwise `ResolutionError::MissingDestination`.

use serde_json::Value;

use courier_types::{
    ConsumerOptions, DeliveryOptions, DestinationSpec, PayloadType, RequestDescriptor,
    ResolutionError, TypeTag,
};

/// What a resolution call is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTarget {
    Destination,
    ConsumerOptions,
    DeliveryOptions,
}

/// Output of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResource {
    Destination(DestinationSpec),
    ConsumerOptions(ConsumerOptions),
    /// `None` leaves the producer's broker defaults untouched.
    DeliveryOptions(Option<DeliveryOptions>),
}

/// Resolve one aspect of a descriptor.
pub fn resolve(
    descriptor: &RequestDescriptor,
    target: ResolutionTarget,
) -> Result<ResolvedResource, ResolutionError> {
    match target {
        ResolutionTarget::Destination => {
            resolve_destination(descriptor).map(ResolvedResource::Destination)
        }
        ResolutionTarget::ConsumerOptions => Ok(ResolvedResource::ConsumerOptions(
            resolve_consumer_options(descriptor),
        )),
        ResolutionTarget::DeliveryOptions => Ok(ResolvedResource::DeliveryOptions(
            resolve_delivery_options(descriptor),
        )),
    }
}

/// Derive the topic a descriptor refers to.
pub fn resolve_destination(
    descriptor: &RequestDescriptor,
) -> Result<DestinationSpec, ResolutionError> {
    if let [argument] = descriptor.arguments() {
        return match argument {
            Value::String(name) => Ok(DestinationSpec::topic(name.as_str())),
            other => Err(ResolutionError::NonStringArgument {
                qualifier: descriptor.qualifier().to_string(),
                found: value_kind(other).to_string(),
            }),
        };
    }

    descriptor
        .annotations()
        .topic
        .as_deref()
        .map(DestinationSpec::topic)
        .ok_or_else(|| ResolutionError::MissingDestination {
            qualifier: descriptor.qualifier().to_string(),
        })
}

/// Selector and no-local flag; absent annotations give the defaults.
#[must_use]
pub fn resolve_consumer_options(descriptor: &RequestDescriptor) -> ConsumerOptions {
    let annotations = descriptor.annotations();
    ConsumerOptions {
        selector: annotations.selector.clone(),
        no_local: annotations.no_local,
    }
}

/// Declared delivery settings, if any.
#[must_use]
pub fn resolve_delivery_options(descriptor: &RequestDescriptor) -> Option<DeliveryOptions> {
    descriptor.annotations().delivery
}

/// First type argument of the descriptor's parameterized payload type.
pub fn extract_payload_type(descriptor: &RequestDescriptor) -> Result<TypeTag, ResolutionError> {
    match descriptor.payload() {
        PayloadType::Plain { name } => Err(ResolutionError::NotParameterized {
            type_name: name.clone(),
        }),
        PayloadType::Parameterized { base, arguments } => {
            arguments
                .first()
                .copied()
                .ok_or_else(|| ResolutionError::NoTypeArguments {
                    type_name: base.clone(),
                })
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
