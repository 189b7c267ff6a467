//! Typed notifications that invalidate cached mesh state.
//!
//! Drawers declare the kinds they care about with an [`EventMask`]. The owner subscribes them to an [`EventHub`], and
//! after publishing it drains each subscription into [`MeshDrawer::handle_event`](crate::MeshDrawer::handle_event).

use crate::heightmap::HeightRect;

use basalt_core::glam::Vec3;
use slab::Slab;
use std::collections::{vec_deque, VecDeque};
use std::ops::BitOr;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TerrainEvent {
    /// Heights inside the rectangle were rewritten.
    HeightMapChanged(HeightRect),
    ViewResized { width: u32, height: u32 },
    SunChanged(Vec3),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EventKind {
    HeightMapChanged,
    ViewResized,
    SunChanged,
}

impl TerrainEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::HeightMapChanged(_) => EventKind::HeightMapChanged,
            Self::ViewResized { .. } => EventKind::ViewResized,
            Self::SunChanged(_) => EventKind::SunChanged,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct EventMask(u8);

impl EventMask {
    pub const NONE: Self = Self(0);
    pub const HEIGHT_MAP_CHANGED: Self = Self::of(EventKind::HeightMapChanged);
    pub const VIEW_RESIZED: Self = Self::of(EventKind::ViewResized);
    pub const SUN_CHANGED: Self = Self::of(EventKind::SunChanged);

    pub const fn of(kind: EventKind) -> Self {
        Self(1 << kind as u8)
    }

    pub fn contains(self, kind: EventKind) -> bool {
        self.0 & Self::of(kind).0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Proof of registration with an [`EventHub`]. Not `Clone`, so each subscription has exactly one reader.
#[derive(Debug, Eq, Hash, PartialEq)]
pub struct Subscription(usize);

struct Subscriber {
    mask: EventMask,
    queue: VecDeque<TerrainEvent>,
}

/// Fans published events out to per-subscriber queues.
#[derive(Default)]
pub struct EventHub {
    subscribers: Slab<Subscriber>,
}

impl EventHub {
    pub fn subscribe(&mut self, mask: EventMask) -> Subscription {
        Subscription(self.subscribers.insert(Subscriber {
            mask,
            queue: VecDeque::new(),
        }))
    }

    /// Drops the subscription along with anything still queued for it.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.subscribers.remove(subscription.0);
    }

    pub fn num_subscribers(&self) -> usize {
        self.subscribers.len()
    }

    /// Queues `event` for every interested subscriber. Returns how many received it.
    pub fn publish(&mut self, event: TerrainEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        for (_, subscriber) in self.subscribers.iter_mut() {
            if subscriber.mask.contains(kind) {
                subscriber.queue.push_back(event);
                delivered += 1;
            }
        }
        log::trace!("Published {:?} to {} subscribers", kind, delivered);
        delivered
    }

    pub fn pending(&self, subscription: &Subscription) -> usize {
        self.subscribers[subscription.0].queue.len()
    }

    /// Takes the queued events of `subscription` in publication order.
    pub fn drain(&mut self, subscription: &Subscription) -> vec_deque::Drain<'_, TerrainEvent> {
        self.subscribers[subscription.0].queue.drain(..)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use crate::heightmap::height_rect;
    use basalt_core::glam::IVec2;

    #[test]
    fn events_only_reach_matching_subscribers() {
        let mut hub = EventHub::default();
        let heights = hub.subscribe(EventMask::HEIGHT_MAP_CHANGED);
        let lighting = hub.subscribe(EventMask::SUN_CHANGED | EventMask::VIEW_RESIZED);

        let rect = height_rect(IVec2::new(1, 2), IVec2::new(3, 4));
        assert_eq!(hub.publish(TerrainEvent::HeightMapChanged(rect)), 1);
        assert_eq!(hub.publish(TerrainEvent::SunChanged(Vec3::Y)), 1);
        assert_eq!(
            hub.publish(TerrainEvent::ViewResized {
                width: 800,
                height: 600
            }),
            1
        );

        assert_eq!(
            hub.drain(&heights).collect::<Vec<_>>(),
            vec![TerrainEvent::HeightMapChanged(rect)]
        );
        assert_eq!(hub.pending(&heights), 0);
        assert_eq!(hub.pending(&lighting), 2);
        assert_eq!(
            hub.drain(&lighting).next(),
            Some(TerrainEvent::SunChanged(Vec3::Y))
        );
    }

    #[test]
    fn unsubscribed_handles_stop_receiving() {
        let mut hub = EventHub::default();
        let sub = hub.subscribe(EventMask::SUN_CHANGED);
        hub.unsubscribe(sub);
        assert_eq!(hub.num_subscribers(), 0);
        assert_eq!(hub.publish(TerrainEvent::SunChanged(Vec3::X)), 0);
        assert!(EventMask::NONE.is_empty());
    }
}
