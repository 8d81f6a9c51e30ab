mod chat_service_tests;
mod key_manager_tests;
