use async_broadcast::{broadcast, Receiver, RecvError, Sender, TryRecvError, TrySendError};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::events::QueueEvent;

pub const DEFAULT_ROOM_CAPACITY: usize = 100;

/// Delivers named events to every listener registered under a session id.
///
/// Delivery is best effort and must not block the caller.
pub trait Notifier: Send + Sync {
	fn notify(&self, room: &str, event: QueueEvent);
}

/// In-process rooms: one `async_broadcast` channel per session id.
///
/// When a room's buffer is full the oldest undelivered event is dropped.
/// Emitting to a room nobody joined is a no-op.
pub struct RoomHub {
	rooms: DashMap<String, Sender<QueueEvent>>,
	capacity: usize,
}

fn open_room(capacity: usize) -> (Sender<QueueEvent>, Receiver<QueueEvent>) {
	let (mut sender, receiver) = broadcast(capacity.max(1));
	sender.set_await_active(false);
	sender.set_overflow(true);
	(sender, receiver)
}

impl RoomHub {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		Self {
			rooms: DashMap::new(),
			capacity,
		}
	}

	/// Registers a new listener for `room`.
	pub fn join(&self, room: &str) -> RoomReceiver {
		let mut opened = None;
		let mut sender = self.rooms.entry(room.to_string()).or_insert_with(|| {
			let (sender, receiver) = open_room(self.capacity);
			opened = Some(receiver);
			sender
		});

		// every earlier listener left, which closed the channel
		if opened.is_none() && sender.is_closed() {
			let (fresh, receiver) = open_room(self.capacity);
			*sender = fresh;
			opened = Some(receiver);
		}

		let receiver = opened.unwrap_or_else(|| sender.new_receiver());
		debug!(room, listeners = sender.receiver_count(), "listener joined room");
		RoomReceiver { room: room.to_string(), inner: receiver }
	}

	#[must_use]
	pub fn listeners(&self, room: &str) -> usize {
		self.rooms.get(room).map_or(0, |sender| sender.receiver_count())
	}

	#[must_use]
	pub fn active_rooms(&self) -> usize {
		self.rooms.iter().filter(|entry| !entry.value().is_closed()).count()
	}

	fn prune(&self, room: &str) {
		self.rooms.remove_if(room, |_, sender| sender.is_closed());
	}
}

impl Default for RoomHub {
	fn default() -> Self {
		Self::new(DEFAULT_ROOM_CAPACITY)
	}
}

impl Notifier for RoomHub {
	fn notify(&self, room: &str, event: QueueEvent) {
		let name = event.name();
		let Some(sender) = self.rooms.get(room) else {
			debug!(room, event = name, "no listeners in room, event dropped");
			return;
		};

		let outcome = sender.try_broadcast(event);
		drop(sender);

		match outcome {
			Ok(None) => debug!(room, event = name, "event delivered"),
			Ok(Some(_)) => warn!(room, event = name, "room buffer full, oldest event dropped"),
			Err(TrySendError::Closed(_)) => {
				debug!(room, event = name, "room has no listeners left, pruning");
				self.prune(room);
			}
			Err(TrySendError::Inactive(_) | TrySendError::Full(_)) => debug!(room, event = name, "event not delivered"),
		}
	}
}

/// One listener in a room.
pub struct RoomReceiver {
	room: String,
	inner: Receiver<QueueEvent>,
}

impl RoomReceiver {
	#[must_use]
	pub fn room(&self) -> &str {
		&self.room
	}

	/// Waits for the next event. Returns `None` once the room is closed.
	pub async fn recv(&mut self) -> Option<QueueEvent> {
		loop {
			match self.inner.recv().await {
				Ok(event) => return Some(event),
				Err(RecvError::Overflowed(skipped)) => warn!(room = %self.room, skipped, "listener lagged, events skipped"),
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Takes the next buffered event without waiting.
	pub fn try_recv(&mut self) -> Option<QueueEvent> {
		loop {
			match self.inner.try_recv() {
				Ok(event) => return Some(event),
				Err(TryRecvError::Overflowed(skipped)) => warn!(room = %self.room, skipped, "listener lagged, events skipped"),
				Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
			}
		}
	}
}
