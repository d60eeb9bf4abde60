/// Opaque block type identifier. The world stores these without interpreting
/// them; the set of valid IDs is provided by an external registry.
///
/// The only semantic this crate enforces is that `BlockId::AIR` (0) is the
/// universal "empty" block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockId(pub u16);

impl BlockId {
    /// The universal "empty" block.
    pub const AIR: BlockId = BlockId(0);

    pub const fn new(id: u16) -> Self {
        Self(id)
    }
}
