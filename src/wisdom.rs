// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `WISDOM` command's pleasantry.
//!
//! spec.md places "the wisdom/fortune pleasantry" outside the lock
//! coordinator's scope; this module stays deliberately trivial and has no
//! dependency on [`crate::lock`] or [`crate::server`] beyond being a
//! recognized command token the dispatcher must answer with *something*.

use std::sync::atomic::{AtomicUsize, Ordering};

const QUIPS: &[&str] = &[
    "A lock held too long is a lock held wrong.",
    "Every writer was once a reader who refused to share.",
    "Deadlocks are just two optimists waiting on each other.",
    "Release what you are not using; abandon what nobody wants.",
    "Fairness within a class is still fairness.",
    "The queue remembers what the greedy reader forgets.",
    "A timeout is a promise kept even when the answer is no.",
];

static NEXT: AtomicUsize = AtomicUsize::new(0);

/// Returns the next quip in rotation. Cheap and thread-agnostic; callers
/// don't need to care that this is a cycle rather than a random draw.
pub fn next() -> &'static str {
    let i = NEXT.fetch_add(1, Ordering::Relaxed) % QUIPS.len();
    QUIPS[i]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_without_panicking() {
        for _ in 0..QUIPS.len() * 2 + 1 {
            assert!(!next().is_empty());
        }
    }
}
