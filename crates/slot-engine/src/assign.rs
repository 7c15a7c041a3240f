//! Resource assignment for generated slots.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Resource, ResourceId};

/// How a slot picks among the resources free for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum AssignPolicy {
    /// Lowest sequence first.
    #[default]
    FirstAvailable,
    /// A seeded random order, drawn once per computation.
    Shuffle {
        #[serde(default)]
        seed: u64,
    },
    /// Each slot starts looking after the resource the previous slot took.
    RoundRobin,
    /// Fewest slots assigned so far in this computation; ties by sequence.
    LeastLoaded,
}

impl AssignPolicy {
    /// The policy for one computation. A shuffle mixes its configured seed
    /// with `salt`, so each request draws its own order while a repeated
    /// request with the same salt draws the same one.
    pub fn for_call(self, salt: u64) -> Self {
        match self {
            AssignPolicy::Shuffle { seed } => {
                let mut state = seed ^ salt.rotate_left(32);
                AssignPolicy::Shuffle {
                    seed: splitmix64(&mut state),
                }
            }
            other => other,
        }
    }
}

/// A resource free for a slot, with the seats it still offers there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub resource: ResourceId,
    pub seats: u32,
}

impl Offer {
    pub fn new(resource: impl Into<ResourceId>, seats: u32) -> Self {
        Offer {
            resource: resource.into(),
            seats,
        }
    }
}

/// Stateful assignment over the slots of one computation.
#[derive(Debug, Clone)]
pub struct Assigner {
    policy: AssignPolicy,
    order: Vec<ResourceId>,
    quorum: usize,
    asked: u32,
    pooled: bool,
    cursor: usize,
    load: HashMap<ResourceId, usize>,
}

impl Assigner {
    /// Fix the resource order for the whole computation: by sequence, then
    /// id, then permuted once if the policy shuffles.
    pub fn new(policy: AssignPolicy, resources: &[Resource], quorum: usize) -> Self {
        let mut sorted: Vec<&Resource> = resources.iter().collect();
        sorted.sort_by(|a, b| a.sequence.cmp(&b.sequence).then_with(|| a.id.cmp(&b.id)));
        let mut seen = HashSet::new();
        let mut order: Vec<ResourceId> = sorted
            .into_iter()
            .map(|r| r.id.clone())
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if let AssignPolicy::Shuffle { seed } = policy {
            shuffle(&mut order, seed);
        }
        Assigner {
            policy,
            order,
            quorum: quorum.max(1),
            asked: 1,
            pooled: false,
            cursor: 0,
            load: HashMap::new(),
        }
    }

    /// Seats every slot must provide. With `pooled` seating the picked
    /// resources add their open seats up; otherwise each one must seat the
    /// whole party on its own.
    pub fn seating(mut self, asked: u32, pooled: bool) -> Self {
        self.asked = asked.max(1);
        self.pooled = pooled;
        self
    }

    /// Resource order this assigner walks.
    pub fn order(&self) -> &[ResourceId] {
        &self.order
    }

    /// Offered resources able to take part in a pick, in assignment order.
    pub fn rank(&self, offers: &[Offer]) -> Vec<ResourceId> {
        self.eligible(offers)
            .into_iter()
            .map(|(i, _)| self.order[i].clone())
            .collect()
    }

    fn eligible(&self, offers: &[Offer]) -> Vec<(usize, u32)> {
        (0..self.order.len())
            .filter_map(|i| {
                let seats = offers
                    .iter()
                    .filter(|o| o.resource == self.order[i])
                    .map(|o| o.seats)
                    .max()?;
                let enough = if self.pooled { seats > 0 } else { seats >= self.asked };
                enough.then_some((i, seats))
            })
            .collect()
    }

    /// Choose at least `quorum` resources among `offers` seating the asked
    /// party, or `None` when the offers fall short. A successful pick updates
    /// round-robin and load state.
    pub fn pick(&mut self, offers: &[Offer]) -> Option<Vec<ResourceId>> {
        let mut ranked = self.eligible(offers);
        if ranked.len() < self.quorum {
            return None;
        }

        let n = self.order.len();
        match self.policy {
            AssignPolicy::FirstAvailable | AssignPolicy::Shuffle { .. } => {}
            AssignPolicy::RoundRobin => ranked.sort_by_key(|&(i, _)| (i + n - self.cursor % n) % n),
            AssignPolicy::LeastLoaded => {
                ranked.sort_by_key(|&(i, _)| (self.load.get(&self.order[i]).copied().unwrap_or(0), i))
            }
        }

        let chosen = self.fill(&ranked)?;
        if self.policy == AssignPolicy::RoundRobin {
            if let Some(&last) = chosen.last() {
                self.cursor = (last + 1) % n;
            }
        }
        let picked: Vec<ResourceId> = chosen.into_iter().map(|i| self.order[i].clone()).collect();
        for id in &picked {
            *self.load.entry(id.clone()).or_insert(0) += 1;
        }
        Some(picked)
    }

    /// Best-fitting resources in `ranked` order: a single resource with
    /// exactly the asked seats when one is enough, else the first `quorum`,
    /// topped up until the seats add up.
    fn fill(&self, ranked: &[(usize, u32)]) -> Option<Vec<usize>> {
        if !self.pooled {
            return Some(ranked.iter().take(self.quorum).map(|&(i, _)| i).collect());
        }
        if self.quorum == 1 {
            if let Some(&(i, _)) = ranked.iter().find(|&&(_, seats)| seats == self.asked) {
                return Some(vec![i]);
            }
        }
        let asked = u64::from(self.asked);
        let mut chosen = Vec::new();
        let mut seats = 0u64;
        for &(i, offered) in ranked {
            if chosen.len() >= self.quorum && seats >= asked {
                break;
            }
            chosen.push(i);
            seats += u64::from(offered);
        }
        (seats >= asked).then_some(chosen)
    }
}

/// Fisher-Yates shuffle driven by splitmix64, so a seed always yields the
/// same permutation.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut state = seed;
    for i in (1..items.len()).rev() {
        let j = (splitmix64(&mut state) % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(names: &[&str]) -> Vec<Resource> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| Resource::new(*n, "UTC").with_sequence(i as i32))
            .collect()
    }

    fn ids(names: &[&str]) -> Vec<ResourceId> {
        names.iter().map(|n| ResourceId::new(*n)).collect()
    }

    fn offers(names: &[&str]) -> Vec<Offer> {
        names.iter().map(|n| Offer::new(*n, 1)).collect()
    }

    #[test]
    fn first_available_follows_sequence() {
        let mut rs = resources(&["a", "b", "c"]);
        rs[0].sequence = 10;
        let mut assigner = Assigner::new(AssignPolicy::FirstAvailable, &rs, 1);
        assert_eq!(assigner.pick(&offers(&["a", "b", "c"])), Some(ids(&["b"])));
        assert_eq!(assigner.pick(&offers(&["a", "c"])), Some(ids(&["c"])));
        assert_eq!(assigner.pick(&offers(&["a"])), Some(ids(&["a"])));
        assert_eq!(assigner.pick(&[]), None);
    }

    #[test]
    fn round_robin_rotates() {
        let rs = resources(&["a", "b", "c"]);
        let mut assigner = Assigner::new(AssignPolicy::RoundRobin, &rs, 1);
        let all = offers(&["a", "b", "c"]);
        let picks: Vec<Vec<ResourceId>> = (0..4).filter_map(|_| assigner.pick(&all)).collect();
        assert_eq!(picks, vec![ids(&["a"]), ids(&["b"]), ids(&["c"]), ids(&["a"])]);
    }

    #[test]
    fn round_robin_skips_busy_resources() {
        let rs = resources(&["a", "b", "c"]);
        let mut assigner = Assigner::new(AssignPolicy::RoundRobin, &rs, 1);
        assert_eq!(assigner.pick(&offers(&["a", "b", "c"])), Some(ids(&["a"])));
        assert_eq!(assigner.pick(&offers(&["a", "c"])), Some(ids(&["c"])));
        assert_eq!(assigner.pick(&offers(&["a", "b", "c"])), Some(ids(&["a"])));
    }

    #[test]
    fn least_loaded_balances() {
        let rs = resources(&["a", "b"]);
        let mut assigner = Assigner::new(AssignPolicy::LeastLoaded, &rs, 1);
        assert_eq!(assigner.pick(&offers(&["a"])), Some(ids(&["a"])));
        assert_eq!(assigner.pick(&offers(&["a", "b"])), Some(ids(&["b"])));
        assert_eq!(assigner.pick(&offers(&["a", "b"])), Some(ids(&["a"])));
    }

    #[test]
    fn shuffle_is_deterministic_per_seed() {
        let names: Vec<String> = (0..12).map(|i| format!("r{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let rs = resources(&refs);
        let a = Assigner::new(AssignPolicy::Shuffle { seed: 7 }, &rs, 1);
        let b = Assigner::new(AssignPolicy::Shuffle { seed: 7 }, &rs, 1);
        let c = Assigner::new(AssignPolicy::Shuffle { seed: 8 }, &rs, 1);
        assert_eq!(a.order(), b.order());
        assert_ne!(a.order(), c.order());

        let mut sorted = a.order().to_vec();
        sorted.sort();
        let mut expected = ids(&refs);
        expected.sort();
        assert_eq!(sorted, expected);
    }

    #[test]
    fn quorum_needs_enough_resources() {
        let rs = resources(&["a", "b", "c"]);
        let mut assigner = Assigner::new(AssignPolicy::FirstAvailable, &rs, 2);
        assert_eq!(assigner.pick(&offers(&["c"])), None);
        assert_eq!(assigner.pick(&offers(&["c", "a"])), Some(ids(&["a", "c"])));
    }

    #[test]
    fn shuffle_seed_varies_per_call() {
        let base = AssignPolicy::Shuffle { seed: 0 };
        assert_eq!(base.for_call(17), base.for_call(17));
        assert_ne!(base.for_call(17), base.for_call(18));
        assert_eq!(AssignPolicy::RoundRobin.for_call(17), AssignPolicy::RoundRobin);
    }

    #[test]
    fn duplicate_ids_count_once() {
        let rs = vec![
            Resource::new("a", "UTC").with_sequence(1),
            Resource::new("b", "UTC").with_sequence(2),
            Resource::new("a", "UTC").with_sequence(3),
        ];
        let mut assigner = Assigner::new(AssignPolicy::FirstAvailable, &rs, 2);
        assert_eq!(assigner.order(), ids(&["a", "b"]).as_slice());
        assert_eq!(assigner.pick(&offers(&["a"])), None);
    }

    #[test]
    fn single_resource_must_seat_the_party_unless_pooled() {
        let rs = resources(&["small", "large"]);
        let seats = vec![Offer::new("small", 2), Offer::new("large", 6)];

        let mut alone = Assigner::new(AssignPolicy::FirstAvailable, &rs, 1).seating(4, false);
        assert_eq!(alone.rank(&seats), ids(&["large"]));
        assert_eq!(alone.pick(&seats), Some(ids(&["large"])));

        let mut pooled = Assigner::new(AssignPolicy::FirstAvailable, &rs, 1).seating(7, true);
        assert_eq!(pooled.pick(&seats), Some(ids(&["small", "large"])));
        assert_eq!(pooled.pick(&seats[..1]), None);
    }

    #[test]
    fn pooled_seating_prefers_an_exact_fit() {
        let rs = resources(&["a", "b", "c"]);
        let seats = vec![Offer::new("a", 6), Offer::new("b", 3), Offer::new("c", 4)];
        let mut assigner = Assigner::new(AssignPolicy::FirstAvailable, &rs, 1).seating(4, true);
        assert_eq!(assigner.pick(&seats), Some(ids(&["c"])));
        let mut assigner = Assigner::new(AssignPolicy::FirstAvailable, &rs, 1).seating(5, true);
        assert_eq!(assigner.pick(&seats), Some(ids(&["a"])));
    }

    #[test]
    fn policy_deserializes_from_tagged_json() {
        let policy: AssignPolicy = serde_json::from_str(r#"{"policy":"shuffle","seed":42}"#).unwrap();
        assert_eq!(policy, AssignPolicy::Shuffle { seed: 42 });
        let policy: AssignPolicy = serde_json::from_str(r#"{"policy":"round_robin"}"#).unwrap();
        assert_eq!(policy, AssignPolicy::RoundRobin);
    }
}
