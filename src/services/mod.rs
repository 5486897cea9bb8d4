mod ventures;

pub use ventures::VentureService;
