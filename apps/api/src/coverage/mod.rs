// Topic Coverage Resolver
// Decides, per extracted topic, whether the indexed corpus contains material
// relevant enough to ground generated teaching content.

pub mod handlers;
pub mod resolver;
