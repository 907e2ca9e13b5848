use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use mockall::predicate::eq;
use oxide_rx::{EventTarget, Listener, ListenerId};

pub(crate) fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

mock! {
    pub(crate) KeyTarget {}

    impl EventTarget<u32> for KeyTarget {
        fn add_listener(&self, listener: Listener<u32>) -> ListenerId;
        fn remove_listener(&self, id: ListenerId);
    }
}

/// Listener slot filled when the mocked target is subscribed to.
pub(crate) type CapturedListener = Arc<Mutex<Option<Listener<u32>>>>;

/// A mocked event target expecting exactly one listener, registered as
/// `id`, and exactly one matching removal.
pub(crate) fn given_a_key_target_expecting_one_listener(id: u64) -> (MockKeyTarget, CapturedListener) {
    let captured: CapturedListener = Arc::new(Mutex::new(None));
    let slot = captured.clone();

    let mut target = MockKeyTarget::new();
    target
        .expect_add_listener()
        .times(1)
        .returning(move |listener| {
            *slot.lock().unwrap() = Some(listener);
            ListenerId(id)
        });
    target
        .expect_remove_listener()
        .with(eq(ListenerId(id)))
        .times(1)
        .return_const(());

    (target, captured)
}

/// Dispatch `event` to the captured listener, as the real target would.
pub(crate) fn dispatch(captured: &CapturedListener, event: u32) {
    let listener = captured.lock().unwrap();
    if let Some(listener) = listener.as_ref() {
        listener(event);
    }
}
