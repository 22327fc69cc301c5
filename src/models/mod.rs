pub mod invoice;
pub mod traveler;
