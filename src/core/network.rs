use crate::types::{Acquisition, Stack};

/// Reference/secondary indices into a [`Stack`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackPair {
    pub reference: usize,
    pub secondary: usize,
}

impl StackPair {
    pub fn acquisitions<'a>(&self, stack: &'a Stack) -> Option<(&'a Acquisition, &'a Acquisition)> {
        Some((stack.get(self.reference)?, stack.get(self.secondary)?))
    }
}

/// Redundant pairing for `n` date-ordered acquisitions.
///
/// Every acquisition is paired with its next neighbour and with the one after
/// that, so a single failed or incoherent pair never disconnects the stack.
/// Order: `(0,1), (0,2), (1,2), (1,3), ..., (n-2, n-1)`. Fewer than two
/// acquisitions yield no pairs.
pub fn pair_indices(n: usize) -> Vec<StackPair> {
    let mut pairs = Vec::new();
    if n < 2 {
        return pairs;
    }

    let mut push = |reference: usize, secondary: usize| {
        let pair = StackPair { reference, secondary };
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    };

    for i in 0..n - 2 {
        push(i, i + 1);
        push(i, i + 2);
    }
    push(n - 2, n - 1);

    pairs
}

/// Interferometric network of a stack, in processing order
pub fn build_network(stack: &Stack) -> Vec<StackPair> {
    let pairs = pair_indices(stack.len());

    for pair in &pairs {
        debug_assert!(
            stack.acquisitions()[pair.reference].date()
                < stack.acquisitions()[pair.secondary].date(),
            "stack must be strictly increasing by date"
        );
    }

    log::info!(
        "Built network of {} pair(s) from {} acquisition(s)",
        pairs.len(),
        stack.len()
    );
    pairs
}
