use super::model::{HealthMap, PoolSnapshot, Upstream};

/// Given a pool snapshot and the current health map, returns candidates in
/// the order the Dispatcher should try them.
///
/// Pure: the same `(snapshot, health)` pair always produces the same
/// ordering, because it reads `health` once per upstream and never mutates
/// either argument. Ordering is ascending effective score
/// (`static_priority + penalty`), tie-broken by descending `static_priority`
/// — the statically preferred upstream keeps its tie-break advantage even
/// after accumulating an equal penalty.
pub fn order_candidates(snapshot: &PoolSnapshot, health: &HealthMap) -> Vec<Upstream> {
    let mut scored: Vec<(i64, Upstream)> = snapshot
        .iter()
        .map(|u| (u.static_priority + health.penalty(u.id), u.clone()))
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_a
            .cmp(score_b)
            .then_with(|| b.static_priority.cmp(&a.static_priority))
    });

    scored.into_iter().map(|(_, u)| u).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn upstream(priority: i64) -> Upstream {
        Upstream {
            id: Uuid::new_v4(),
            name: "u".into(),
            base_url: "http://up/".into(),
            credential: "k".into(),
            static_priority: priority,
        }
    }

    #[test]
    fn orders_by_static_priority_when_healthy() {
        let a = upstream(5);
        let b = upstream(0);
        let snapshot = PoolSnapshot::new(vec![a.clone(), b.clone()]);
        let health = HealthMap::new();

        let order = order_candidates(&snapshot, &health);
        assert_eq!(order[0].id, b.id);
        assert_eq!(order[1].id, a.id);
    }

    #[test]
    fn penalty_overrides_static_priority() {
        let a = upstream(0);
        let b = upstream(1);
        let snapshot = PoolSnapshot::new(vec![a.clone(), b.clone()]);
        let health = HealthMap::new();
        health.record_failure(a.id); // a: 0 + 10 = 10
        health.record_failure(a.id); // a: 20

        let order = order_candidates(&snapshot, &health);
        assert_eq!(order[0].id, b.id);
        assert_eq!(order[1].id, a.id);
    }

    #[test]
    fn ties_break_toward_higher_static_priority() {
        // a: priority 0, one failure -> effective score 10.
        // b: priority 10, no failures -> effective score 10. Tie.
        let a = upstream(0);
        let b = upstream(10);
        let snapshot = PoolSnapshot::new(vec![a.clone(), b.clone()]);
        let health = HealthMap::new();
        health.record_failure(a.id);

        let order = order_candidates(&snapshot, &health);
        // b has the higher static_priority, so it wins the tie.
        assert_eq!(order[0].id, b.id);
        assert_eq!(order[1].id, a.id);
    }

    #[test]
    fn pure_same_inputs_same_output() {
        let a = upstream(3);
        let b = upstream(1);
        let snapshot = PoolSnapshot::new(vec![a, b]);
        let health = HealthMap::new();

        let first = order_candidates(&snapshot, &health);
        let second = order_candidates(&snapshot, &health);
        let first_ids: Vec<_> = first.iter().map(|u| u.id).collect();
        let second_ids: Vec<_> = second.iter().map(|u| u.id).collect();
        assert_eq!(first_ids, second_ids);
    }
}
