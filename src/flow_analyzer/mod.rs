pub mod route_advisor;
