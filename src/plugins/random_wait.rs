use super::{OperationContext, Plugin, PluginKind};
use rand::Rng;
use std::time::Duration;

enum WaitKind {
    Short,
    Mid,
    Long,
}

/// Grounded on `random_wait_plugin.py`. Probabilities grow after each
/// "short" wait and reset to their base values whenever a mid/long wait
/// fires, so long stretches without a deliberate pause become increasingly
/// likely to trigger one.
pub struct RandomWaitPlugin {
    name: String,
    min_wait_ms: u64,
    mid_wait_ms: u64,
    max_wait_ms: u64,
    long_interval: u32,
    mid_interval: u32,
    base_long_prob: f64,
    base_mid_prob: f64,
    growth: f64,
    op_count: u32,
    p_long: f64,
    p_mid: f64,
}

impl RandomWaitPlugin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        min_wait_ms: u64,
        mid_wait_ms: u64,
        max_wait_ms: u64,
        long_interval: u32,
        mid_interval: u32,
        base_long_prob: f64,
        base_mid_prob: f64,
        growth: f64,
    ) -> Self {
        Self {
            name,
            min_wait_ms,
            mid_wait_ms,
            max_wait_ms,
            long_interval,
            mid_interval,
            base_long_prob,
            base_mid_prob,
            growth,
            op_count: 0,
            p_long: base_long_prob,
            p_mid: base_mid_prob,
        }
    }

    fn choose_kind(&self) -> WaitKind {
        if self.long_interval > 0 && self.op_count % self.long_interval == 0 {
            return WaitKind::Long;
        }
        if self.mid_interval > 0 && self.op_count % self.mid_interval == 0 {
            return WaitKind::Mid;
        }
        let r: f64 = rand::thread_rng().gen_range(0.0..1.0);
        if r < self.p_long {
            WaitKind::Long
        } else if r < self.p_long + self.p_mid {
            WaitKind::Mid
        } else {
            WaitKind::Short
        }
    }

    fn duration_for(&self, kind: &WaitKind) -> Duration {
        let mut rng = rand::thread_rng();
        let ms = match kind {
            WaitKind::Short => rng.gen_range(self.min_wait_ms..=(self.min_wait_ms * 3 / 2).max(self.min_wait_ms + 1)),
            WaitKind::Mid => rng.gen_range(self.min_wait_ms..=self.mid_wait_ms.max(self.min_wait_ms)),
            WaitKind::Long => rng.gen_range(self.mid_wait_ms..=self.max_wait_ms.max(self.mid_wait_ms)),
        };
        Duration::from_millis(ms)
    }

    fn update_probabilities(&mut self, kind: &WaitKind) {
        match kind {
            WaitKind::Short => {
                self.p_long = (self.p_long + self.growth).min(0.3);
                self.p_mid = (self.p_mid + self.growth).min(0.4);
            }
            WaitKind::Mid | WaitKind::Long => {
                self.p_long = self.base_long_prob;
                self.p_mid = self.base_mid_prob;
            }
        }
    }
}

#[async_trait::async_trait]
impl Plugin for RandomWaitPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PluginKind {
        PluginKind::RandomWait
    }

    async fn after_exec(&mut self, _ctx: &OperationContext) {
        self.op_count += 1;
        let kind = self.choose_kind();
        let wait = self.duration_for(&kind);
        self.update_probabilities(&kind);
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plugin() -> RandomWaitPlugin {
        RandomWaitPlugin::new("random_wait".into(), 1, 2, 3, 1_000_000, 1_000_000, 0.05, 0.15, 0.02)
    }

    #[test]
    fn probability_resets_after_long_wait() {
        let mut p = plugin();
        p.update_probabilities(&WaitKind::Short);
        assert!(p.p_long > p.base_long_prob);
        p.update_probabilities(&WaitKind::Long);
        assert_eq!(p.p_long, p.base_long_prob);
        assert_eq!(p.p_mid, p.base_mid_prob);
    }

    #[test]
    fn probability_growth_is_clamped() {
        let mut p = plugin();
        for _ in 0..1000 {
            p.update_probabilities(&WaitKind::Short);
        }
        assert!(p.p_long <= 0.3);
        assert!(p.p_mid <= 0.4);
    }

    #[test]
    fn forced_long_interval_overrides_probability() {
        let mut p = RandomWaitPlugin::new("rw".into(), 1, 2, 3, 5, 1_000_000, 0.0, 0.0, 0.0);
        p.op_count = 5;
        assert!(matches!(p.choose_kind(), WaitKind::Long));
    }
}
