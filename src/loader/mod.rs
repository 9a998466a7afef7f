pub mod seed_loader;
