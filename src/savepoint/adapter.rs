//! The capability interface host adapters implement.

use crate::savepoint::error::PrimitiveError;

/// Savepoint primitives of a transaction backend.
///
/// Implementations are the raw, hook-free operations. Wrap them in a
/// [`SavepointInterceptor`](crate::savepoint::SavepointInterceptor) so that
/// lifecycle hooks fire around every boundary.
pub trait SavepointAdapter {
    /// What a successful primitive call hands back.
    type Output;

    /// Release the innermost savepoint.
    fn release_savepoint(&mut self) -> Result<Self::Output, PrimitiveError>;

    /// Roll back to the innermost savepoint.
    fn rollback_to_savepoint(&mut self) -> Result<Self::Output, PrimitiveError>;

    /// Name of this adapter variant, used in logs and installation records.
    fn adapter_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<A: SavepointAdapter + ?Sized> SavepointAdapter for Box<A> {
    type Output = A::Output;

    fn release_savepoint(&mut self) -> Result<Self::Output, PrimitiveError> {
        (**self).release_savepoint()
    }

    fn rollback_to_savepoint(&mut self) -> Result<Self::Output, PrimitiveError> {
        (**self).rollback_to_savepoint()
    }

    fn adapter_name(&self) -> &'static str {
        (**self).adapter_name()
    }
}
