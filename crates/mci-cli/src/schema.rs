pub mod evolution_report;
