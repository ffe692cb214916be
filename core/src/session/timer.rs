//! 会话自动关闭倒计时。
//!
//! 同一时间只存在一组计时任务（每秒一次的 tick 与到期触发）。每次 `arm` 都先在这里统一
//! `disarm`，并递增代数；旧代数的信号即使已经进入通道也会在 `accept` 中被丢弃。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// 计时任务发往会话运行时的原始信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSignal {
    Tick { generation: u64 },
    Fire { generation: u64 },
}

/// 经过代数校验后的有效事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining_secs: u64 },
    Fired,
}

struct ArmedTimer {
    generation: u64,
    deadline: Instant,
    ticker: JoinHandle<()>,
    firing: JoinHandle<()>,
}

impl ArmedTimer {
    fn cancel(self) {
        self.ticker.abort();
        self.firing.abort();
    }
}

pub struct AutoCloseTimer {
    signals: mpsc::Sender<TimerSignal>,
    generation: u64,
    armed: Option<ArmedTimer>,
    countdown: Option<u64>,
}

impl std::fmt::Debug for AutoCloseTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCloseTimer")
            .field("generation", &self.generation)
            .field("armed", &self.armed.is_some())
            .field("countdown", &self.countdown)
            .finish()
    }
}

impl AutoCloseTimer {
    pub fn new(signals: mpsc::Sender<TimerSignal>) -> Self {
        Self {
            signals,
            generation: 0,
            armed: None,
            countdown: None,
        }
    }

    pub fn arm(&mut self, delay: Duration) {
        self.disarm();
        self.generation += 1;

        let generation = self.generation;
        let deadline = Instant::now() + delay;

        let tick_tx = self.signals.clone();
        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match tick_tx.try_send(TimerSignal::Tick { generation }) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        let fire_tx = self.signals.clone();
        let firing = tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = fire_tx.send(TimerSignal::Fire { generation }).await;
        });

        self.armed = Some(ArmedTimer {
            generation,
            deadline,
            ticker,
            firing,
        });
        self.countdown = Some(ceil_secs(delay));
    }

    pub fn rearm(&mut self, delay: Duration) {
        self.arm(delay);
    }

    /// 停止倒计时但不结束会话，展示值停留在停止时刻。
    pub fn disarm(&mut self) -> bool {
        match self.armed.take() {
            Some(armed) => {
                self.countdown = Some(remaining_secs(armed.deadline));
                armed.cancel();
                true
            }
            None => false,
        }
    }

    pub fn accept(&mut self, signal: TimerSignal) -> Option<TimerEvent> {
        let armed = self.armed.as_ref()?;

        match signal {
            TimerSignal::Tick { generation } if generation == armed.generation => {
                let remaining = remaining_secs(armed.deadline);
                self.countdown = Some(remaining);
                Some(TimerEvent::Tick {
                    remaining_secs: remaining,
                })
            }
            TimerSignal::Fire { generation } if generation == armed.generation => {
                if let Some(armed) = self.armed.take() {
                    armed.cancel();
                }
                self.countdown = Some(0);
                Some(TimerEvent::Fired)
            }
            _ => None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// 供展示的剩余秒数。
    pub fn countdown(&self) -> Option<u64> {
        self.countdown
    }
}

impl Drop for AutoCloseTimer {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.cancel();
        }
    }
}

fn remaining_secs(deadline: Instant) -> u64 {
    ceil_secs(deadline.saturating_duration_since(Instant::now()))
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(timer: &mut AutoCloseTimer, rx: &mut mpsc::Receiver<TimerSignal>) -> Vec<TimerEvent> {
        let mut events = Vec::new();
        while let Ok(signal) = rx.try_recv() {
            if let Some(event) = timer.accept(signal) {
                events.push(event);
            }
        }
        events
    }

    #[test]
    fn ceil_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(0)), 0);
        assert_eq!(ceil_secs(Duration::from_millis(1)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(1_000)), 1);
        assert_eq!(ceil_secs(Duration::from_millis(29_500)), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_follow_the_deadline_and_fire_once() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut timer = AutoCloseTimer::new(tx);
        timer.arm(Duration::from_secs(3));
        assert_eq!(timer.countdown(), Some(3));

        let mut events = Vec::new();
        for _ in 0..4 {
            tokio::time::advance(Duration::from_secs(1)).await;
            settle().await;
            events.extend(drain(&mut timer, &mut rx));
        }

        assert!(events.contains(&TimerEvent::Tick { remaining_secs: 2 }));
        assert!(events.contains(&TimerEvent::Tick { remaining_secs: 1 }));
        assert_eq!(
            events
                .iter()
                .filter(|event| **event == TimerEvent::Fired)
                .count(),
            1
        );
        assert!(!timer.is_armed());
        assert_eq!(timer.countdown(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_cancels_the_previous_deadline() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timer = AutoCloseTimer::new(tx);
        timer.arm(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        drain(&mut timer, &mut rx);

        timer.rearm(Duration::from_secs(60));
        assert_eq!(timer.countdown(), Some(60));

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        let events = drain(&mut timer, &mut rx);
        assert!(!events.contains(&TimerEvent::Fired));
        assert!(timer.is_armed());
        assert_eq!(timer.countdown(), Some(29));

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        let events = drain(&mut timer, &mut rx);
        assert_eq!(
            events
                .iter()
                .filter(|event| **event == TimerEvent::Fired)
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_freezes_countdown_without_firing() {
        let (tx, mut rx) = mpsc::channel(256);
        let mut timer = AutoCloseTimer::new(tx);
        timer.arm(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        drain(&mut timer, &mut rx);
        assert_eq!(timer.countdown(), Some(30));

        assert!(timer.disarm());
        assert!(!timer.disarm());
        assert_eq!(timer.countdown(), Some(30));

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert!(drain(&mut timer, &mut rx).is_empty());
        assert_eq!(timer.countdown(), Some(30));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_signals_are_ignored() {
        let (tx, _rx) = mpsc::channel(8);
        let mut timer = AutoCloseTimer::new(tx);
        timer.arm(Duration::from_secs(10));
        timer.rearm(Duration::from_secs(10));

        assert_eq!(timer.accept(TimerSignal::Fire { generation: 1 }), None);
        assert_eq!(timer.accept(TimerSignal::Tick { generation: 1 }), None);
        assert_eq!(
            timer.accept(TimerSignal::Fire { generation: 2 }),
            Some(TimerEvent::Fired)
        );
    }
}
