#![no_main]

use bookhook::fuzz_api::extract_bookings;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for booking in extract_bookings(data) {
        assert!(!booking.phone.trim().is_empty());
        assert!(booking.services.iter().all(|s| !s.is_empty()));
    }
});
