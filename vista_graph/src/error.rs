use thiserror::Error;
use vista_ids::ObjectId;
use vista_script::ExpressionError;

/// Errors surfaced by graph operations. None of these unwind out of a flush
/// pass; `read` returns them only for direct caller mistakes (stale handles,
/// unknown names) and for loops detected while settling the requested
/// property.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("binding loop detected: {chain}")]
    BindingLoop { chain: String },

    #[error("stale reference: object {id} no longer exists")]
    StaleReference { id: ObjectId },

    #[error("unknown property '{name}' on '{object}'")]
    UnknownProperty { object: String, name: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),
}
