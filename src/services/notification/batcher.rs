/// Splits `items` into consecutive chunks of at most `max_chunk_size`.
///
/// Order is preserved within and across chunks and only the last chunk may be
/// shorter. A `max_chunk_size` of zero is treated as one.
#[must_use]
pub fn chunk<T>(items: Vec<T>, max_chunk_size: usize) -> Vec<Vec<T>> {
    let size = max_chunk_size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
