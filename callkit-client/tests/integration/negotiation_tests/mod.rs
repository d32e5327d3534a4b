mod test_ice_candidates;
mod test_rtc_transport;
