//! # Request Descriptors
//!
//! A `RequestDescriptor` is what application code hands the runtime when it
//! asks for a topic, producer, consumer, publisher, or subscriber: a
//! qualifier name, the payload type, declarative annotations, and optional
//! positional arguments.
//!
//! Annotations are flattened once, when the descriptor is built. Direct
//! annotations win over those inherited through a stereotype, and nearer
//! stereotypes win over more distant ones, so resolution at request time
//! only reads already-resolved values.
//!
//! ```text
//! Qualifier "audit-feed"
//!   ├── Selector("kind = 'audit'")          <- direct, wins
//!   └── Stereotype "audited"
//!         ├── Selector("kind = 'any'")      <- shadowed
//!         └── Topic("audit")                <- inherited
//! ```

use std::any::{type_name, TypeId};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::destination::DeliveryOptions;
use crate::errors::ResolutionError;

/// Runtime identity of a statically known Rust type.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Declared type of the requested resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadType {
    /// A type without parameters.
    Plain { name: String },
    /// A generic type such as `EventSubscriber<OrderPlaced>`.
    Parameterized { base: String, arguments: Vec<TypeTag> },
}

impl PayloadType {
    /// A non-generic type.
    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self::Plain { name: name.into() }
    }

    /// A generic type with the given arguments.
    #[must_use]
    pub fn parameterized(base: impl Into<String>, arguments: Vec<TypeTag>) -> Self {
        Self::Parameterized {
            base: base.into(),
            arguments,
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain { name } => f.write_str(name),
            Self::Parameterized { base, arguments } => {
                let names: Vec<&str> = arguments.iter().map(TypeTag::name).collect();
                write!(f, "{}<{}>", base, names.join(", "))
            }
        }
    }
}

/// Declarative marker attached to a qualifier or a stereotype.
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    /// Names the topic the resource is bound to.
    Topic(String),
    /// Producer delivery settings.
    Delivery(DeliveryOptions),
    /// Consumer filter expression.
    Selector(String),
    /// Suppress delivery of messages sent on the consumer's own connection.
    NoLocal,
    /// Inherit every annotation of a named stereotype.
    Stereotype(Arc<Stereotype>),
}

/// A named, reusable bundle of annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Stereotype {
    name: String,
    annotations: Vec<Annotation>,
}

impl Stereotype {
    /// Creates a stereotype.
    #[must_use]
    pub fn new(name: impl Into<String>, annotations: Vec<Annotation>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            annotations,
        })
    }

    /// Stereotype name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Annotations carried by this stereotype.
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }
}

/// Annotation values after stereotype flattening.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAnnotations {
    /// Declared topic name.
    pub topic: Option<String>,
    /// Declared delivery settings.
    pub delivery: Option<DeliveryOptions>,
    /// Declared selector.
    pub selector: Option<String>,
    /// Whether `NoLocal` is present anywhere reachable.
    pub no_local: bool,
}

impl ResolvedAnnotations {
    /// Flattens direct and stereotype annotations, nearest first.
    #[must_use]
    pub fn flatten(annotations: &[Annotation]) -> Self {
        Self {
            topic: first_reachable(annotations, |annotation| match annotation {
                Annotation::Topic(name) => Some(name.clone()),
                _ => None,
            }),
            delivery: first_reachable(annotations, |annotation| match annotation {
                Annotation::Delivery(options) => Some(*options),
                _ => None,
            }),
            selector: first_reachable(annotations, |annotation| match annotation {
                Annotation::Selector(expression) => Some(expression.clone()),
                _ => None,
            }),
            no_local: first_reachable(annotations, |annotation| {
                matches!(annotation, Annotation::NoLocal).then_some(())
            })
            .is_some(),
        }
    }
}

/// Breadth-first search through the annotation set and its stereotypes.
fn first_reachable<T>(roots: &[Annotation], pick: impl Fn(&Annotation) -> Option<T>) -> Option<T> {
    let mut level: VecDeque<&[Annotation]> = VecDeque::from([roots]);

    while let Some(annotations) = level.pop_front() {
        if let Some(found) = annotations.iter().find_map(&pick) {
            return Some(found);
        }
        for annotation in annotations {
            if let Annotation::Stereotype(stereotype) = annotation {
                level.push_back(stereotype.annotations());
            }
        }
    }

    None
}

/// An immutable, validated request for a broker resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    qualifier: String,
    payload: PayloadType,
    annotations: ResolvedAnnotations,
    arguments: Vec<Value>,
}

impl RequestDescriptor {
    /// Starts building a descriptor for the given qualifier.
    #[must_use]
    pub fn builder(qualifier: impl Into<String>) -> RequestDescriptorBuilder {
        RequestDescriptorBuilder::new(qualifier.into())
    }

    /// A descriptor naming its destination through a single positional
    /// argument.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            qualifier: name.clone(),
            payload: PayloadType::plain(name.clone()),
            annotations: ResolvedAnnotations::default(),
            arguments: vec![Value::String(name)],
        }
    }

    /// Qualifier name.
    #[must_use]
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// Declared payload type.
    #[must_use]
    pub fn payload(&self) -> &PayloadType {
        &self.payload
    }

    /// Flattened annotations.
    #[must_use]
    pub fn annotations(&self) -> &ResolvedAnnotations {
        &self.annotations
    }

    /// Positional arguments supplied at the call site.
    #[must_use]
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }
}

/// Builder for [`RequestDescriptor`].
#[derive(Debug, Clone)]
pub struct RequestDescriptorBuilder {
    qualifier: String,
    payload: Option<PayloadType>,
    annotations: Vec<Annotation>,
    arguments: Vec<Value>,
}

impl RequestDescriptorBuilder {
    fn new(qualifier: String) -> Self {
        Self {
            qualifier,
            payload: None,
            annotations: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Declares the payload type.
    #[must_use]
    pub fn payload(mut self, payload: PayloadType) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Declares the payload as `base<T>`, the common shape for typed
    /// publishers and subscribers.
    #[must_use]
    pub fn event<T: 'static>(self, base: &str) -> Self {
        self.payload(PayloadType::parameterized(base, vec![TypeTag::of::<T>()]))
    }

    /// Adds an annotation directly on the qualifier.
    #[must_use]
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Shorthand for `annotate(Annotation::Topic(..))`.
    #[must_use]
    pub fn topic(self, name: impl Into<String>) -> Self {
        self.annotate(Annotation::Topic(name.into()))
    }

    /// Shorthand for `annotate(Annotation::Stereotype(..))`.
    #[must_use]
    pub fn stereotype(self, stereotype: Arc<Stereotype>) -> Self {
        self.annotate(Annotation::Stereotype(stereotype))
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn argument(mut self, argument: impl Into<Value>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Flattens the annotations and validates them.
    ///
    /// # Errors
    ///
    /// `ResolutionError::InvalidPriority` when a reachable delivery
    /// annotation declares a priority above 9.
    pub fn build(self) -> Result<RequestDescriptor, ResolutionError> {
        let annotations = ResolvedAnnotations::flatten(&self.annotations);
        if let Some(delivery) = &annotations.delivery {
            delivery.validate()?;
        }

        let payload = self
            .payload
            .unwrap_or_else(|| PayloadType::plain(self.qualifier.clone()));

        Ok(RequestDescriptor {
            qualifier: self.qualifier,
            payload,
            annotations,
            arguments: self.arguments,
        })
    }
}
